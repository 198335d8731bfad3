//! Credential updates over the MySQL wire protocol
//!
//! Both the database tier and the ProxySQL admin interface speak the MySQL
//! protocol, so a single sqlx-based client covers them. Every operation opens
//! one connection, runs its batch, and explicitly closes the connection
//! regardless of outcome; no session outlives a reconciliation pass.
//!
//! Statements are assembled with escaped string literals because account
//! names and hosts appear in positions where the protocol does not accept
//! bind parameters (`ALTER USER`, `CREATE USER`).

use async_trait::async_trait;
use sqlx::{ConnectOptions, Connection};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while pushing credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to {op}: {source}")]
    Execute {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Network endpoint of a credential-accepting component
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Administrative account used to authenticate a session
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub user: String,
    pub password: String,
}

/// One account whose password must be pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordUpdate {
    pub account: String,
    pub password: String,
    /// Login hosts of the account; empty for accounts without database logins
    pub hosts: &'static [&'static str],
}

/// Batch credential updates against the database and proxy admin interfaces.
///
/// A trait so reconciliation logic can run against a recording fake in tests.
#[async_trait]
pub trait CredentialClient: Send + Sync {
    /// Push changed passwords for accounts with database logins, in one session
    async fn update_database_passwords(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        updates: &[PasswordUpdate],
    ) -> CredentialResult<()>;

    /// Create a database account with full grants on every listed host
    async fn create_account(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        account: &str,
        hosts: &[&str],
        password: &str,
    ) -> CredentialResult<()>;

    /// Push changed passwords into the ProxySQL user table, in one session
    async fn update_proxy_passwords(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        updates: &[PasswordUpdate],
    ) -> CredentialResult<()>;
}

/// Production [`CredentialClient`] speaking the MySQL protocol via sqlx
#[derive(Debug, Clone, Default)]
pub struct MysqlCredentialClient;

#[async_trait]
impl CredentialClient for MysqlCredentialClient {
    async fn update_database_passwords(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        updates: &[PasswordUpdate],
    ) -> CredentialResult<()> {
        let mut statements = Vec::new();
        for update in updates {
            for host in update.hosts {
                statements.push(alter_user_statement(&update.account, host, &update.password));
            }
        }
        statements.push("FLUSH PRIVILEGES".to_string());

        debug!(
            host = %endpoint.host,
            accounts = updates.len(),
            "Updating database account passwords"
        );
        run_session(endpoint, admin, statements, "update account passwords").await
    }

    async fn create_account(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        account: &str,
        hosts: &[&str],
        password: &str,
    ) -> CredentialResult<()> {
        let mut statements = Vec::new();
        for host in hosts {
            statements.push(create_user_statement(account, host, password));
            statements.push(grant_all_statement(account, host));
        }
        statements.push("FLUSH PRIVILEGES".to_string());

        debug!(host = %endpoint.host, account = %account, "Creating database account");
        run_session(endpoint, admin, statements, "create account").await
    }

    async fn update_proxy_passwords(
        &self,
        endpoint: &Endpoint,
        admin: &AdminCredentials,
        updates: &[PasswordUpdate],
    ) -> CredentialResult<()> {
        let mut statements: Vec<String> = updates
            .iter()
            .map(|u| proxy_update_statement(&u.account, &u.password))
            .collect();
        statements.push("LOAD MYSQL USERS TO RUNTIME".to_string());
        statements.push("SAVE MYSQL USERS TO DISK".to_string());

        debug!(
            host = %endpoint.host,
            accounts = updates.len(),
            "Updating proxy account passwords"
        );
        run_session(endpoint, admin, statements, "update proxy passwords").await
    }
}

/// Open a connection, run the batch, and close the connection on every path
async fn run_session(
    endpoint: &Endpoint,
    admin: &AdminCredentials,
    statements: Vec<String>,
    op: &'static str,
) -> CredentialResult<()> {
    let options = MySqlConnectOptions::new()
        .host(&endpoint.host)
        .port(endpoint.port)
        .username(&admin.user)
        .password(&admin.password);

    let mut conn: MySqlConnection =
        options
            .connect()
            .await
            .map_err(|source| CredentialError::Connect {
                host: endpoint.host.clone(),
                source,
            })?;

    let result = run_statements(&mut conn, &statements, op).await;

    if let Err(e) = conn.close().await {
        warn!(host = %endpoint.host, error = %e, "Failed to close credential session cleanly");
    }

    result
}

async fn run_statements(
    conn: &mut MySqlConnection,
    statements: &[String],
    op: &'static str,
) -> CredentialResult<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|source| CredentialError::Execute { op, source })?;
    }
    Ok(())
}

fn alter_user_statement(account: &str, host: &str, password: &str) -> String {
    format!(
        "ALTER USER {} IDENTIFIED BY '{}'",
        quote_account(account, host),
        escape_string(password)
    )
}

fn create_user_statement(account: &str, host: &str, password: &str) -> String {
    format!(
        "CREATE USER IF NOT EXISTS {} IDENTIFIED BY '{}'",
        quote_account(account, host),
        escape_string(password)
    )
}

fn grant_all_statement(account: &str, host: &str) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON *.* TO {} WITH GRANT OPTION",
        quote_account(account, host)
    )
}

fn proxy_update_statement(account: &str, password: &str) -> String {
    format!(
        "UPDATE mysql_users SET password='{}' WHERE username='{}'",
        escape_string(password),
        escape_string(account)
    )
}

/// Quote an `'account'@'host'` pair for use in account-management statements
fn quote_account(account: &str, host: &str) -> String {
    format!("'{}'@'{}'", escape_string(account), escape_string(host))
}

/// Escape a MySQL string literal
///
/// Doubles single quotes and backslashes so untrusted values cannot break
/// out of the literal. For example:
/// - `hello` -> `hello`
/// - `it's` -> `it''s`
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}
