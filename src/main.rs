use breeders_room::config::Config;
use breeders_room::db::Database;
use breeders_room::error::{AppError, Result};
use breeders_room::observability::init_tracing;
use breeders_room::parent_request::{ProposeInput, StatusUpdate};
use breeders_room::pets::PetInput;
use breeders_room::types::{RequestStatus, Role, Sex};
use breeders_room::{init, serve, Service, CURRENT_SCHEMA};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "breeders-room")]
#[command(author, version, about = "Pet lineage, breeding records and adoption listings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create .breeders-room/ with a database and config.toml
    Init {
        /// Directory to initialize (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Start the JSON API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Worker threads (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print shell completions
    Completion {
        shell: Shell,
    },

    /// Show the database schema version
    Schema,

    /// Register a pet
    AddPet {
        name: String,

        /// Owner user id
        #[arg(long)]
        owner: String,

        #[arg(long, default_value = "leopard gecko")]
        species: String,

        /// male, female or unknown
        #[arg(long)]
        sex: Option<Sex>,

        /// Morph tag (repeatable)
        #[arg(long = "morph")]
        morphs: Vec<String>,

        /// Trait tag (repeatable)
        #[arg(long = "trait")]
        traits: Vec<String>,

        /// Hatching date, YYYY-MM-DD
        #[arg(long)]
        hatched: Option<String>,

        /// Weight in grams
        #[arg(long)]
        weight: Option<f64>,

        /// Hide from other users
        #[arg(long)]
        private: bool,

        /// Register as a hatchling of this laying
        #[arg(long)]
        laying: Option<i32>,
    },

    /// List a breeder's pets
    Pets {
        #[arg(long)]
        owner: String,

        /// View as this user (default: anonymous)
        #[arg(long = "as", value_name = "USER")]
        viewer: Option<String>,
    },

    /// Soft-delete a pet
    DeletePet {
        pet: i32,

        #[arg(long = "as", value_name = "USER")]
        user: String,
    },

    /// Propose a parent for a pet
    Propose {
        child: i32,
        parent: i32,

        /// father or mother
        #[arg(long)]
        role: Role,

        #[arg(long = "as", value_name = "USER")]
        user: String,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// List parent requests sent by or addressed to a user
    Requests {
        #[arg(long = "as", value_name = "USER")]
        user: String,

        #[arg(long)]
        status: Option<RequestStatus>,
    },

    /// Approve, reject or cancel a parent request
    RequestStatus {
        id: i32,

        /// approved, rejected or cancelled
        status: RequestStatus,

        #[arg(long = "as", value_name = "USER")]
        user: String,

        /// Reason shown to the requester on rejection
        #[arg(long)]
        reason: Option<String>,
    },

    /// Remove a recorded parent from a pet
    Withdraw {
        child: i32,

        #[arg(long)]
        role: Role,

        #[arg(long = "as", value_name = "USER")]
        user: String,
    },

    /// Show a pet's parents
    Parents {
        pet: i32,

        #[arg(long = "as", value_name = "USER")]
        viewer: Option<String>,
    },

    /// Show a pet's full siblings grouped by clutch
    Siblings {
        pet: i32,

        #[arg(long = "as", value_name = "USER")]
        viewer: Option<String>,
    },

    /// Show a breeder's pairs, matings, layings and hatchlings
    FamilyTree {
        #[arg(long)]
        owner: String,

        #[arg(long = "as", value_name = "USER")]
        viewer: Option<String>,
    },

    /// Declare a breeding pair
    Pair {
        father: i32,
        mother: i32,

        #[arg(long = "as", value_name = "USER")]
        user: String,
    },

    /// Record a mating of a pair
    Mate {
        pair: i32,

        /// Mating date, YYYY-MM-DD
        date: String,

        #[arg(long = "as", value_name = "USER")]
        user: String,
    },

    /// Record a clutch laid after a mating
    Lay {
        mating: i32,

        /// Laying date, YYYY-MM-DD
        date: String,

        /// Clutch number (default: next for the mating)
        #[arg(long)]
        clutch: Option<i32>,

        #[arg(long)]
        eggs: Option<i32>,

        #[arg(long = "as", value_name = "USER")]
        user: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load();
    init_tracing(&config.log.filter);

    if let Err(e) = run(cli.command, config) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(match e {
            AppError::Internal(_) | AppError::Db(_) => 2,
            _ => 1,
        });
    }
}

fn open_service(config: &Config) -> Result<Service> {
    let db = Database::open()?;
    Ok(Service::new(db, config.lineage.approver))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| AppError::Internal(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Init { dir } => {
            let root = match dir {
                Some(dir) => dir,
                None => std::env::current_dir().map_err(|e| AppError::Internal(e.to_string()))?,
            };
            init::init_project(&root).map_err(AppError::Internal)?;
        }

        Command::Serve { port, host, workers } => {
            let mut server = config.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(workers) = workers {
                server.workers = workers;
            }
            let service = open_service(&config)?;
            serve::start_api_server(service, &server).map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;
        }

        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "breeders-room", &mut std::io::stdout());
        }

        Command::Schema => {
            let service = open_service(&config)?;
            let stored = service.db().stored_schema_version()?;
            println!("Schema: {}", CURRENT_SCHEMA);
            println!("Stored: {}", stored.unwrap_or_else(|| "none".to_string()));
            println!("Database: {}", Database::db_path().display());
        }

        Command::AddPet { name, owner, species, sex, morphs, traits, hatched, weight, private, laying } => {
            let service = open_service(&config)?;
            let input = PetInput {
                name,
                species,
                sex,
                morphs,
                traits,
                hatching_date: hatched,
                weight,
                is_public: Some(!private),
                laying_id: laying,
            };
            let pet = service.create_pet(&owner, &input)?;
            println!("{} pet {} ({})", "Created".green(), pet.id, pet.name);
        }

        Command::Pets { owner, viewer } => {
            let service = open_service(&config)?;
            print_json(&service.list_pets(&owner, viewer.as_deref())?)?;
        }

        Command::DeletePet { pet, user } => {
            let service = open_service(&config)?;
            service.delete_pet(pet, &user)?;
            println!("{} pet {}", "Deleted".yellow(), pet);
        }

        Command::Propose { child, parent, role, user, message } => {
            let service = open_service(&config)?;
            let input = ProposeInput {
                child_pet_id: child,
                parent_pet_id: parent,
                role,
                message,
            };
            let request = service.propose(&user, &input)?;
            println!("{} parent request {} ({})", "Created".green(), request.id, request.status);
        }

        Command::Requests { user, status } => {
            let service = open_service(&config)?;
            print_json(&service.list_requests_for_user(&user, status)?)?;
        }

        Command::RequestStatus { id, status, user, reason } => {
            let service = open_service(&config)?;
            let update = StatusUpdate {
                status,
                reject_reason: reason,
            };
            let request = service.update_request_status(id, &user, &update)?;
            println!("{} parent request {} is {}", "Updated".green(), request.id, request.status);
        }

        Command::Withdraw { child, role, user } => {
            let service = open_service(&config)?;
            let withdrawn = service.withdraw_parent(child, role, &user)?;
            println!("{} {} of pet {} ({} requests)", "Withdrew".yellow(), role, child, withdrawn);
        }

        Command::Parents { pet, viewer } => {
            let service = open_service(&config)?;
            print_json(&service.get_parents_with_request_status(pet, viewer.as_deref())?)?;
        }

        Command::Siblings { pet, viewer } => {
            let service = open_service(&config)?;
            print_json(&service.get_siblings(pet, viewer.as_deref())?)?;
        }

        Command::FamilyTree { owner, viewer } => {
            let service = open_service(&config)?;
            print_json(&service.get_family_tree(&owner, viewer.as_deref())?)?;
        }

        Command::Pair { father, mother, user } => {
            let service = open_service(&config)?;
            let pair = service.create_pair(&user, father, mother)?;
            println!("{} pair {} ({} x {})", "Created".green(), pair.id, pair.father_id, pair.mother_id);
        }

        Command::Mate { pair, date, user } => {
            let service = open_service(&config)?;
            let mating = service.create_mating(&user, pair, &date)?;
            println!("{} mating {} on {}", "Recorded".green(), mating.id, mating.mating_date);
        }

        Command::Lay { mating, date, clutch, eggs, user } => {
            let service = open_service(&config)?;
            let laying = service.create_laying(&user, mating, &date, clutch, eggs)?;
            println!("{} laying {} (clutch {})", "Recorded".green(), laying.id, laying.clutch);
        }
    }
    Ok(())
}
