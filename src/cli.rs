//! Provisioning subcommands for the `token-guard` binary.
//!
//! Credentials are administered directly against storage; the bearer
//! token is printed exactly once at issue time and cannot be recovered
//! afterwards, since only the payload digest is persisted.

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::credential::{Header, NewCredential};
use crate::error::ProvisionError;
use crate::storage::RedisStorage;
use crate::token::{Key, KeyId};

/// Forward-auth credential validator.
#[derive(Parser)]
#[command(name = "token-guard", version, about)]
pub struct Cli {
    /// Subcommand; the auth server runs when none is given.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Administrative subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Issue a new credential and print its bearer token.
    Issue(IssueArgs),
    /// Delete a credential by key id.
    Revoke {
        /// Public identifier of the credential to delete.
        key_id: KeyId,
    },
    /// List provisioned credentials.
    List,
}

/// Arguments for `issue`.
#[derive(Args)]
pub struct IssueArgs {
    /// Owning user.
    #[arg(long)]
    pub user: String,

    /// Display label.
    #[arg(long, default_value = "")]
    pub label: String,

    /// Host glob pattern (empty matches any host).
    #[arg(long, default_value = "")]
    pub host: String,

    /// Path glob pattern (empty matches any path).
    #[arg(long, default_value = "")]
    pub path: String,

    /// Header to inject on success, as `Name: Value`. Repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<Header>,
}

fn parse_header(raw: &str) -> Result<Header, String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: Value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok(Header {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

/// Issue a credential and print the one-time bearer token.
///
/// # Errors
///
/// Fails on key generation failure, malformed glob patterns, or backend
/// errors.
pub async fn issue(config: &Config, args: IssueArgs) -> Result<(), ProvisionError> {
    let storage = RedisStorage::connect(&config.redis_url).await?;
    let key = Key::generate()?;
    let cred = storage
        .store_credential(
            &key,
            NewCredential {
                user: args.user,
                label: args.label,
                host: args.host,
                path: args.path,
                headers: args.headers,
            },
        )
        .await?;

    println!("id:     {}", cred.id);
    println!("key id: {}", cred.key_id);
    println!("token:  {key}");
    println!("(the token is shown only once; store it now)");
    Ok(())
}

/// Delete a credential by key id.
///
/// # Errors
///
/// Fails on backend errors.
pub async fn revoke(config: &Config, key_id: KeyId) -> Result<(), ProvisionError> {
    let storage = RedisStorage::connect(&config.redis_url).await?;
    if storage.delete_credential(key_id).await? {
        println!("revoked {key_id}");
    } else {
        println!("no credential with key id {key_id}");
    }
    Ok(())
}

/// Print all provisioned credentials.
///
/// # Errors
///
/// Fails on backend errors.
pub async fn list(config: &Config) -> Result<(), ProvisionError> {
    let storage = RedisStorage::connect(&config.redis_url).await?;
    let creds = storage.list_credentials().await?;
    if creds.is_empty() {
        println!("no credentials");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<16} {:<20} {:<20} {:>10}", "id", "hint", "user", "host", "path", "requests");
    for cred in creds {
        println!(
            "{:<6} {:<12} {:<16} {:<20} {:<20} {:>10}",
            cred.id,
            cred.hint(),
            cred.user,
            if cred.host.is_empty() { "**" } else { &cred.host },
            if cred.path.is_empty() { "/**" } else { &cred.path },
            cred.requests,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let header = parse_header("X-Role: admin").unwrap();
        assert_eq!(header.name, "X-Role");
        assert_eq!(header.value, "admin");

        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_cli_parses_issue() {
        let cli = Cli::parse_from([
            "token-guard",
            "issue",
            "--user",
            "admin",
            "--host",
            "*.example.com",
            "--header",
            "X-Role: guest",
        ]);
        match cli.command {
            Some(Command::Issue(args)) => {
                assert_eq!(args.user, "admin");
                assert_eq!(args.host, "*.example.com");
                assert_eq!(args.headers.len(), 1);
            }
            _ => panic!("expected issue subcommand"),
        }
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::parse_from(["token-guard"]);
        assert!(cli.command.is_none());
    }
}
