use community_directory::api;
use community_directory::configuration::{get_configuration, BackendKind, Settings};
use community_directory::models::{Collection, Fields, Query};
use community_directory::services::auth::{hash_password, Role};
use community_directory::utils::display::DisplayFormatter;
use community_directory::utils::local_storage::LocalStorage;
use community_directory::{DirectoryError, DirectoryService};
use serde_json::Value;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, error, info};

const MODERATION_FIELDS: [&str; 2] = ["approved", "rejected"];

/// Everything the prompt loop carries between commands.
struct AppState {
    settings: Settings,
    storage: Arc<LocalStorage>,
    service: DirectoryService,
    display: DisplayFormatter,
    token: Option<String>,
}

impl AppState {
    fn require_admin(&self) -> Result<(), DirectoryError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| DirectoryError::Authentication("log in as admin first".into()))?;
        let claims = self.service.verify_token(token)?;
        if claims.role != Role::Admin {
            return Err(DirectoryError::Authentication("admin role required".into()));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting community directory");

    let settings = get_configuration()?;
    let storage = Arc::new(match &settings.storage_path {
        Some(path) => LocalStorage::open(path)?,
        None => LocalStorage::in_memory(),
    });
    let service = DirectoryService::from_settings(&settings, storage.clone())?;

    let mut state = AppState {
        settings,
        storage,
        service,
        display: DisplayFormatter::new(),
        token: None,
    };

    println!("=== Community Directory ({} backend) ===", state.service.backend_name());
    print_help();

    let mut input = String::new();
    loop {
        input.clear();
        print!("> ");
        io::stdout().flush()?;
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let words: Vec<&str> = input.split_whitespace().collect();
        let Some((command, args)) = words.split_first() else {
            continue;
        };
        if *command == "exit" {
            debug!("Received exit command");
            break;
        }

        if let Err(e) = run_command(&mut state, command, args).await {
            error!("{} failed: {}", command, e);
            println!("{}", e.user_message());
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn run_command(state: &mut AppState, command: &str, args: &[&str]) -> Result<(), DirectoryError> {
    match (command, args) {
        ("help", _) => print_help(),
        ("list", [collection]) => {
            let collection: Collection = collection.parse()?;
            let records = state.service.get(collection, &Query::new()).await?;
            println!("{}", state.display.format_header(&format!("{} ({})", collection, records.len())));
            println!("{}", state.display.format_record_table(collection, &records));
        }
        ("search", [collection, terms @ ..]) if !terms.is_empty() => {
            let collection: Collection = collection.parse()?;
            let query = Query::new().with_search(&terms.join(" "));
            let records = state.service.get(collection, &query).await?;
            println!("{}", state.display.format_record_table(collection, &records));
        }
        ("add", [collection, pairs @ ..]) => {
            let collection: Collection = collection.parse()?;
            let fields = parse_fields(pairs)?;
            // Shops go through registration so phone numbers stay unique.
            let record = match collection {
                Collection::Shops => state.service.register(fields).await?,
                _ => state.service.save(collection, fields).await?,
            };
            println!("{}", state.display.format_record(collection, &record));
        }
        ("update", [collection, id, pairs @ ..]) => {
            let collection: Collection = collection.parse()?;
            let fields = parse_fields(pairs)?;
            if touches_moderation(collection, &fields) {
                state.require_admin()?;
            }
            let record = state.service.update(collection, id, fields).await?;
            println!("{}", state.display.format_record(collection, &record));
        }
        ("delete", [collection, id]) => {
            state.require_admin()?;
            let collection: Collection = collection.parse()?;
            state.service.delete(collection, id).await?;
            println!("Deleted.");
        }
        ("approve" | "reject", [collection, id]) => {
            state.require_admin()?;
            let collection: Collection = collection.parse()?;
            let record = state
                .service
                .approve(collection, id, command == "approve")
                .await?;
            println!("{} is now {}", record.id, state.display.format_review_state(&record));
        }
        ("pending", [collection]) => {
            state.require_admin()?;
            let collection: Collection = collection.parse()?;
            let records = state.service.pending(collection).await?;
            println!("{}", state.display.format_record_table(collection, &records));
        }
        ("login", [role, username, password]) => {
            let session = state.service.login(username, password, role.parse()?).await?;
            println!("Logged in as {} ({})", session.claims.sub, session.claims.role);
            state.token = Some(session.token);
        }
        ("logout", _) => {
            state.token = None;
            println!("Logged out.");
        }
        ("whoami", _) => match state.token.as_deref() {
            Some(token) => {
                let claims = state.service.verify_token(token)?;
                println!("{} ({})", claims.sub, claims.role);
            }
            None => println!("Not logged in."),
        },
        ("register", pairs) => {
            let shop = state.service.register(parse_fields(pairs)?).await?;
            println!("{}", state.display.format_record(Collection::Shops, &shop));
        }
        ("set-url", url) => {
            api::set_base_url_override(&state.storage, url.first().copied().unwrap_or(""))?;
            if state.settings.backend == BackendKind::Script {
                state.service = DirectoryService::from_settings(&state.settings, state.storage.clone())?;
                println!("Endpoint updated.");
            } else {
                println!("Saved; it takes effect when the script backend is selected.");
            }
        }
        ("clear-cache", _) => {
            let removed = state.service.clear_cache()?;
            println!("Dropped {} cached lists.", removed);
        }
        ("hash", [password]) => println!("{}", hash_password(password)),
        _ => println!("Unknown command. Type 'help' for the list."),
    }
    Ok(())
}

/// `key=value` words into record fields. Values stay text except
/// `true`/`false`, so phone numbers keep their leading zeros.
fn parse_fields(pairs: &[&str]) -> Result<Fields, DirectoryError> {
    let mut fields = Fields::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| DirectoryError::Validation(format!("expected key=value, got '{}'", pair)))?;
        let value = match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            // Underscores stand in for spaces: name=Abu_Omar
            other => Value::String(other.replace('_', " ")),
        };
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

/// Moderation flags only change through an admin session.
fn touches_moderation(collection: Collection, fields: &Fields) -> bool {
    collection.is_approvable() && MODERATION_FIELDS.iter().any(|f| fields.contains_key(*f))
}

fn print_help() {
    println!("Commands:");
    println!("  list <collection>                     - Show all entries");
    println!("  search <collection> <words>           - Free-text search");
    println!("  add <collection> key=value ...        - Add an entry");
    println!("  update <collection> <id> key=value .. - Change an entry");
    println!("  delete <collection> <id>              - Remove an entry (admin)");
    println!("  approve|reject <collection> <id>      - Moderate an offer or ad (admin)");
    println!("  pending <collection>                  - Offers or ads awaiting review (admin)");
    println!("  login <admin|shop> <user> <password>  - Start a session");
    println!("  logout | whoami");
    println!("  register key=value ...                - Create a shop account");
    println!("  set-url <url>                         - Override the script endpoint");
    println!("  clear-cache                           - Forget cached lists");
    println!("  hash <password>                       - Print a password hash for configuration");
    println!("  exit                                  - Exit the program");
    println!(
        "Collections: {}",
        Collection::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
    );
}
