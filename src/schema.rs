// Breeder's Room schema - pets, lineage and breeding tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    pets (id) {
        id -> Integer,
        owner_id -> Nullable<Text>,
        name -> Text,
        species -> Text,
        sex -> Text,
        morphs_json -> Text,
        traits_json -> Text,
        hatching_date -> Nullable<Text>,
        weight -> Nullable<Double>,
        laying_id -> Nullable<Integer>,
        is_public -> Bool,
        is_deleted -> Bool,
        deleted_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

// ============================================================================
// Lineage Tables
// ============================================================================

diesel::table! {
    parent_requests (id) {
        id -> Integer,
        requester_id -> Text,
        child_pet_id -> Integer,
        parent_pet_id -> Integer,
        role -> Text,                    // 'FATHER' | 'MOTHER'
        status -> Text,                  // 'PENDING' | 'APPROVED' | 'REJECTED' | 'CANCELLED' | 'DELETED'
        message -> Nullable<Text>,
        reject_reason -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    pet_relations (pet_id) {
        pet_id -> Integer,
        father_id -> Nullable<Integer>,
        mother_id -> Nullable<Integer>,
        updated_at -> Text,
    }
}

// ============================================================================
// Breeding Tables
// ============================================================================

diesel::table! {
    pairs (id) {
        id -> Integer,
        owner_id -> Text,
        species -> Text,
        father_id -> Integer,
        mother_id -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    matings (id) {
        id -> Integer,
        pair_id -> Integer,
        father_id -> Integer,
        mother_id -> Integer,
        mating_date -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    layings (id) {
        id -> Integer,
        mating_id -> Integer,
        laying_date -> Text,
        clutch -> Integer,               // Ordinal within the mating, 1-based
        egg_count -> Nullable<Integer>,
        created_at -> Text,
    }
}

// ============================================================================
// Marketplace Tables
// ============================================================================

diesel::table! {
    adoptions (id) {
        id -> Integer,
        pet_id -> Integer,
        seller_id -> Text,
        buyer_id -> Nullable<Text>,
        status -> Text,                  // 'NFS' | 'ON_SALE' | 'ON_RESERVATION' | 'SOLD'
        price -> Nullable<Integer>,
        adoption_date -> Nullable<Text>,
        memo -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    notifications (id) {
        id -> Integer,
        receiver_id -> Text,
        notification_type -> Text,
        target_id -> Integer,
        detail_json -> Text,
        is_read -> Bool,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    pets,
    parent_requests,
    pet_relations,
    pairs,
    matings,
    layings,
    adoptions,
    notifications,
);
