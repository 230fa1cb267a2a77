use std::path::PathBuf;
use std::sync::Arc;

use authstore::config::{AuthConfig, ConfigError};
use authstore::remote::supabase::SupabaseClient;
use authstore::remote::{AuthChangeEvent, AuthEvent, RemoteError};
use authstore::routes;
use authstore::storage::FileStorage;
use authstore::{SessionState, SessionStore, spawn_auth_listener};
use clap::{Parser, Subcommand};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
    #[error("{0}")]
    Operation(String),
}

#[derive(Parser, Debug)]
#[command(name = "authstore", about = "Sign in to a Supabase project and inspect the local session")]
struct Cli {
    /// Overrides `AUTH_STORAGE_DIR`.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Print the current session state.
    Whoami,
    /// Exchange the refresh token for a new access token.
    Refresh,
    /// Show where the route guard sends `path` for the current session.
    Route {
        path: String,
    },
    /// Print every state change until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = AuthConfig::from_env()?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }

    let storage = Arc::new(FileStorage::new(config.storage_dir.clone()));
    let client = Arc::new(SupabaseClient::new(&config, storage.clone())?);
    let store = SessionStore::new(client.clone(), client.clone(), storage);

    // Reconcile the persisted identity with the restored token session
    // before any command looks at the state.
    store.apply_auth_event(client.initialize().await).await;

    run(&cli.command, &store, &client).await
}

async fn run(command: &Command, store: &SessionStore, client: &SupabaseClient) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            store.login(email, password).await;
            report(store)
        }
        Command::Signup { name, email, password } => {
            store.signup(name, email, password).await;
            report(store)
        }
        Command::Logout => {
            store.logout().await;
            report(store)
        }
        Command::Whoami => print_state(&store.state()),
        Command::Refresh => {
            let session = client.refresh_session().await?;
            store
                .apply_auth_event(AuthEvent::new(AuthChangeEvent::TokenRefreshed, Some(session)))
                .await;
            print_state(&store.state())
        }
        Command::Route { path } => {
            let navigation = routes::resolve(path, store.is_authenticated());
            println!("{}", serde_json::to_string(&navigation)?);
            Ok(())
        }
        Command::Watch => watch(store).await,
    }
}

/// Print the state and fail if the operation left an error behind.
fn report(store: &SessionStore) -> Result<(), CliError> {
    let state = store.state();
    print_state(&state)?;
    match state.error {
        Some(message) => Err(CliError::Operation(message)),
        None => Ok(()),
    }
}

fn print_state(state: &SessionState) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

/// One-shot commands apply their own outcome; only `watch` follows
/// remote session changes through the listener.
async fn watch(store: &SessionStore) -> Result<(), CliError> {
    let listener = spawn_auth_listener(store.clone());
    let result = follow(store).await;
    listener.abort();
    result
}

async fn follow(store: &SessionStore) -> Result<(), CliError> {
    let mut rx = store.subscribe();
    let initial = rx.borrow_and_update().clone();
    print_state(&initial)?;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                print_state(&state)?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    Ok(())
}
