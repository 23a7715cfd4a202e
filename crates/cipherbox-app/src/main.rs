// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cipherbox: token-gated text store with a letter-substitution cipher.
//
// Entry point. Initialises logging, opens the backend services, and runs a
// single command.  Results are written to stdout as JSON, logs go to stderr.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use cipherbox_core::error::{CipherboxError, ErrorKind};
use cipherbox_core::types::TextId;
use services::app_services::AppServices;

#[derive(Parser, Debug)]
#[command(name = "cipherbox", version, about, long_about = None)]
struct Cli {
    /// Data directory (defaults to the XDG data dir)
    #[arg(long, env = "CIPHERBOX_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Auth {
    /// Credential issued by `login`
    #[arg(long, env = "CIPHERBOX_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Args, Debug)]
struct Account {
    #[arg(long)]
    email: String,

    #[arg(long, env = "CIPHERBOX_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register(Account),
    /// Exchange email and password for a token
    Login(Account),
    /// Change an account password
    Passwd {
        #[command(flatten)]
        account: Account,
        #[arg(long)]
        new_password: String,
    },
    /// Encode free text with a key
    Encode {
        #[command(flatten)]
        auth: Auth,
        text: String,
        #[arg(long)]
        key: String,
    },
    /// Decode free text with a key
    Decode {
        #[command(flatten)]
        auth: Auth,
        text: String,
        #[arg(long)]
        key: String,
    },
    /// Store a new text
    Add {
        #[command(flatten)]
        auth: Auth,
        content: String,
        /// Preferred id, used when free
        #[arg(long)]
        id: Option<i64>,
    },
    /// Show one stored text
    Get {
        #[command(flatten)]
        auth: Auth,
        id: i64,
    },
    /// Replace the content of a stored text
    Update {
        #[command(flatten)]
        auth: Auth,
        id: i64,
        content: String,
    },
    /// Delete a stored text
    Delete {
        #[command(flatten)]
        auth: Auth,
        id: i64,
    },
    /// List your stored texts
    List {
        #[command(flatten)]
        auth: Auth,
    },
    /// Encode a stored text without changing it
    EncryptText {
        #[command(flatten)]
        auth: Auth,
        id: i64,
        #[arg(long)]
        key: String,
    },
    /// Decode a stored text without changing it
    DecryptText {
        #[command(flatten)]
        auth: Auth,
        id: i64,
        #[arg(long)]
        key: String,
    },
    /// Show your most recent audit entries
    History {
        #[command(flatten)]
        auth: Auth,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Delete your whole audit trail
    ClearHistory {
        #[command(flatten)]
        auth: Auth,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let kind = e.kind();
            tracing::error!(error = %e, ?kind, "command failed");
            eprintln!("{}", json!({ "error": format!("{kind:?}"), "message": e.to_string() }));
            ExitCode::from(exit_code(kind))
        }
    }
}

fn run(cli: Cli) -> Result<String, CipherboxError> {
    let svc = match cli.data_dir {
        Some(dir) => AppServices::open(dir)?,
        None => AppServices::init()?,
    };
    tracing::debug!(
        data_dir = %svc.data_dir().display(),
        token_ttl_secs = svc.config().token_ttl_secs,
        "services ready"
    );

    match cli.command {
        Command::Register(a) => render(&svc.register(&a.email, &a.password)?),
        Command::Login(a) => render(&svc.login(&a.email, &a.password)?),
        Command::Passwd {
            account,
            new_password,
        } => {
            svc.change_password(&account.email, &account.password, &new_password)?;
            render(&json!({ "changed": true }))
        }
        Command::Encode { auth, text, key } => render(&svc.encrypt(&auth.token, &text, &key)?),
        Command::Decode { auth, text, key } => render(&svc.decrypt(&auth.token, &text, &key)?),
        Command::Add { auth, content, id } => {
            render(&svc.add_text(&auth.token, &content, id.map(TextId))?)
        }
        Command::Get { auth, id } => render(&svc.get_text(&auth.token, TextId(id))?),
        Command::Update { auth, id, content } => {
            svc.update_text(&auth.token, TextId(id), &content)?;
            render(&json!({ "id": id, "updated": true }))
        }
        Command::Delete { auth, id } => render(&svc.delete_text(&auth.token, TextId(id))?),
        Command::List { auth } => render(&svc.list_texts(&auth.token)?),
        Command::EncryptText { auth, id, key } => {
            render(&svc.encrypt_text(&auth.token, TextId(id), &key)?)
        }
        Command::DecryptText { auth, id, key } => {
            render(&svc.decrypt_text(&auth.token, TextId(id), &key)?)
        }
        Command::History { auth, limit } => render(&svc.history(&auth.token, limit)?),
        Command::ClearHistory { auth } => {
            let removed = svc.clear_history(&auth.token)?;
            render(&json!({ "removed": removed }))
        }
    }
}

fn render<T: Serialize>(value: &T) -> Result<String, CipherboxError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::InvalidInput => 2,
        ErrorKind::Authentication => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::NotOwner => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_authenticated_command() {
        let cli = Cli::try_parse_from([
            "cipherbox", "encrypt-text", "--token", "v1.aa.bb", "7", "--key", "abc",
        ])
        .unwrap();
        match cli.command {
            Command::EncryptText { auth, id, key } => {
                assert_eq!(auth.token, "v1.aa.bb");
                assert_eq!(id, 7);
                assert_eq!(key, "abc");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn every_kind_exits_non_zero() {
        for kind in [
            ErrorKind::Internal,
            ErrorKind::InvalidInput,
            ErrorKind::Authentication,
            ErrorKind::NotFound,
            ErrorKind::NotOwner,
        ] {
            assert_ne!(exit_code(kind), 0);
        }
    }
}
