//! gatekitctl - run the gateway or drive its API from the terminal

mod cli;
mod client;

use clap::Parser;
use serde_json::json;

use gatekit_core::GatewayConfig;
use gatekit_server::App;

use crate::cli::{Cli, Commands, KeyCommands, ProjectCommands};
use crate::client::{ApiClient, CliError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekit=info,gatekitctl=info".into()),
        )
        .init();

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve => serve().await,
        command => {
            let client = ApiClient::new(cli.api_url, cli.api_key)?;
            client_command(&client, command).await
        }
    }
}

async fn serve() -> Result<(), CliError> {
    let config = GatewayConfig::from_env()
        .map_err(|e| CliError::generic(format!("configuration error: {e}")))?;
    let app = App::build(config)
        .await
        .map_err(|e| CliError::generic(format!("startup failed: {e}")))?;
    app.serve()
        .await
        .map_err(|e| CliError::generic(format!("server failed: {e}")))
}

async fn client_command(client: &ApiClient, command: Commands) -> Result<(), CliError> {
    let output = match command {
        Commands::Serve => unreachable!("handled above"),
        Commands::Whoami => client.get("/api/v1/auth/whoami").await?,
        Commands::Send { project, targets, text } => {
            if targets.is_empty() {
                return Err(CliError {
                    message: "at least one --target is required".into(),
                    exit_code: 4,
                });
            }
            client
                .post(
                    &format!("/api/v1/projects/{project}/messages/send"),
                    json!({ "targets": targets, "content": { "text": text } }),
                )
                .await?
        }
        Commands::Status { project, job_id } => {
            client
                .get(&format!("/api/v1/projects/{project}/messages/status/{job_id}"))
                .await?
        }
        Commands::Keys { command } => match command {
            KeyCommands::Create { project, name, scopes, expires_in_days } => {
                client
                    .post(
                        &format!("/api/v1/projects/{project}/keys"),
                        json!({
                            "name": name,
                            "scopes": scopes,
                            "expiresInDays": expires_in_days,
                        }),
                    )
                    .await?
            }
            KeyCommands::List { project } => {
                client.get(&format!("/api/v1/projects/{project}/keys")).await?
            }
            KeyCommands::Revoke { project, key_id } => {
                client
                    .delete(&format!("/api/v1/projects/{project}/keys/{key_id}"))
                    .await?
            }
            KeyCommands::Roll { project, key_id } => {
                client
                    .post(&format!("/api/v1/projects/{project}/keys/{key_id}/roll"), json!({}))
                    .await?
            }
        },
        Commands::Projects { command } => match command {
            ProjectCommands::List => client.get("/api/v1/projects").await?,
            ProjectCommands::Get { project } => {
                client.get(&format!("/api/v1/projects/{project}")).await?
            }
            ProjectCommands::Create { name, slug } => {
                client
                    .post("/api/v1/projects", json!({ "name": name, "slug": slug }))
                    .await?
            }
        },
    };

    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| CliError::generic(format!("unrenderable response: {e}")))?;
    println!("{rendered}");
    Ok(())
}
