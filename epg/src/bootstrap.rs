//! Post-startup role and database creation.

use postgres::Client;

use crate::config::{InstanceConfig, DEFAULT_DATABASE};
use crate::connection::ConnectionParams;
use crate::error::{Error, Result};

/// What [`bootstrap`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// The requested role did not exist and was created.
    pub role_created: bool,
    /// The requested database did not exist and was created.
    pub database_created: bool,
}

/// Creates the configured role and database through the `admin`
/// connection.
///
/// Every statement is guarded by an existence check, so running it again
/// against a reused cluster only refreshes the role's password. A role other
/// than the superuser is created with `LOGIN` and owns the database it asked
/// for.
///
/// # Errors
///
/// Returns [`Error::Bootstrap`] naming the statement that failed.
pub fn bootstrap(admin: &ConnectionParams, config: &InstanceConfig) -> Result<BootstrapOutcome> {
    let mut client = admin
        .to_client_config()
        .connect(postgres::NoTls)
        .map_err(|source| Error::Bootstrap {
            statement: "connect".to_string(),
            source,
        })?;
    let mut outcome = BootstrapOutcome::default();

    let user = quote_identifier(config.username());
    let password = quote_literal(config.password());

    if config.uses_superuser() {
        execute(&mut client, &format!("ALTER ROLE {user} WITH PASSWORD {password}"))?;
    } else if exists(
        &mut client,
        "SELECT 1 FROM pg_roles WHERE rolname = $1",
        config.username(),
    )? {
        execute(
            &mut client,
            &format!("ALTER ROLE {user} WITH LOGIN PASSWORD {password}"),
        )?;
    } else {
        execute(
            &mut client,
            &format!("CREATE ROLE {user} WITH LOGIN PASSWORD {password}"),
        )?;
        outcome.role_created = true;
    }

    if config.database() == DEFAULT_DATABASE {
        if !config.uses_superuser() {
            execute(&mut client, &format!("GRANT ALL ON SCHEMA public TO {user}"))?;
        }
    } else {
        let db = quote_identifier(config.database());
        if !exists(
            &mut client,
            "SELECT 1 FROM pg_database WHERE datname = $1",
            config.database(),
        )? {
            execute(&mut client, &format!("CREATE DATABASE {db} OWNER {user}"))?;
            outcome.database_created = true;
        }
        execute(
            &mut client,
            &format!("GRANT ALL PRIVILEGES ON DATABASE {db} TO {user}"),
        )?;
    }

    log::info!(
        "bootstrapped role {} (created: {}) and database {} (created: {})",
        config.username(),
        outcome.role_created,
        config.database(),
        outcome.database_created,
    );
    Ok(outcome)
}

fn exists(client: &mut Client, query: &str, name: &str) -> Result<bool> {
    client
        .query_opt(query, &[&name])
        .map(|row| row.is_some())
        .map_err(|source| Error::Bootstrap {
            statement: query.to_string(),
            source,
        })
}

fn execute(client: &mut Client, statement: &str) -> Result<()> {
    log::debug!("bootstrap: {}", redact(statement));
    client
        .batch_execute(statement)
        .map_err(|source| Error::Bootstrap {
            statement: redact(statement),
            source,
        })
}

/// Hides the password literal from logs and errors.
fn redact(statement: &str) -> String {
    match statement.find(" PASSWORD ") {
        Some(idx) => format!("{} PASSWORD '***'", &statement[..idx]),
        None => statement.to_string(),
    }
}

/// Double-quotes an identifier.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quotes a string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("alice"), "\"alice\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("pw"), "'pw'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("CREATE ROLE \"a\" WITH LOGIN PASSWORD 'secret'"),
            "CREATE ROLE \"a\" WITH LOGIN PASSWORD '***'"
        );
        assert_eq!(
            redact("GRANT ALL ON SCHEMA public TO \"a\""),
            "GRANT ALL ON SCHEMA public TO \"a\""
        );
    }
}
