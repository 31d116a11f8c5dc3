//! Database operations for `users`, `agents` and `agent_accounts`.
//!
//! Agents may only reference accounts already present in `accounts`; any
//! reference to an unknown handle is rejected with [`DbError::Conflict`].

use std::collections::{BTreeSet, HashMap};

use callsheet_core::{normalize_handle, AccountRef};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::DbError;

/// A row from `agents`, joined with the owning wallet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub id: i64,
    pub user_id: i64,
    pub wallet_address: String,
    pub name: String,
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AgentWithAccounts {
    pub agent: AgentRow,
    pub accounts: Vec<AccountRef>,
}

#[derive(Debug, Clone)]
pub struct AgentMergeOutcome {
    pub agent: AgentWithAccounts,
    pub created: bool,
}

/// Partial update applied by [`update_agent`].
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub wallet_address: String,
    pub agent_name: String,
    pub new_agent_name: Option<String>,
    pub add_accounts: Vec<AccountRef>,
    pub remove_accounts: Vec<String>,
    pub update_influences: Vec<AccountRef>,
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, sqlx::FromRow)]
struct AgentAccountRow {
    agent_id: i64,
    account_handle: String,
    influence: f64,
}

const AGENT_SELECT: &str = "SELECT ag.id, ag.user_id, u.wallet_address, ag.name, ag.categories, \
            ag.created_at, ag.updated_at \
     FROM agents ag \
     JOIN users u ON u.id = ag.user_id";

/// Create an agent, or merge into the existing agent of the same name.
///
/// On merge, accounts already on the agent keep their influence and
/// categories are unioned. The owning user row is created on first use.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if any referenced account is unknown, or
/// [`DbError::Sqlx`] on query failure.
pub async fn create_or_merge_agent(
    pool: &PgPool,
    wallet_address: &str,
    agent_name: &str,
    accounts: &[AccountRef],
    categories: &[String],
) -> Result<AgentMergeOutcome, DbError> {
    let refs = normalized_refs(accounts);
    let handles: Vec<String> = refs.iter().map(|r| r.username.clone()).collect();
    let categories = normalized_categories(categories);

    let mut tx = pool.begin().await?;
    ensure_accounts_exist(&mut tx, &handles).await?;

    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (wallet_address) VALUES ($1) \
         ON CONFLICT (wallet_address) DO UPDATE SET wallet_address = EXCLUDED.wallet_address \
         RETURNING id",
    )
    .bind(wallet_address.trim())
    .fetch_one(&mut *tx)
    .await?;

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM agents WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(agent_name.trim())
            .fetch_optional(&mut *tx)
            .await?;

    let (agent_id, created) = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE agents SET \
                     categories = ARRAY( \
                         SELECT DISTINCT c FROM unnest(categories || $2::text[]) AS c ORDER BY c \
                     ), \
                     updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&categories)
            .execute(&mut *tx)
            .await?;
            (id, false)
        }
        None => {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO agents (user_id, name, categories) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(user_id)
            .bind(agent_name.trim())
            .bind(&categories)
            .fetch_one(&mut *tx)
            .await?;
            (id, true)
        }
    };

    for account in &refs {
        sqlx::query(
            "INSERT INTO agent_accounts (agent_id, account_handle, influence) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (agent_id, account_handle) DO NOTHING",
        )
        .bind(agent_id)
        .bind(&account.username)
        .bind(account.influence)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let agent = get_agent(pool, agent_id).await?;
    Ok(AgentMergeOutcome { agent, created })
}

/// Apply a partial update to an existing agent.
///
/// Removals are applied before additions. Influence updates must target
/// accounts that remain on the agent.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the agent does not exist, a rename would
/// collide with another agent of the same wallet, an added account is
/// unknown, or an influence update targets an account not on the agent.
pub async fn update_agent(pool: &PgPool, update: &AgentUpdate) -> Result<AgentWithAccounts, DbError> {
    let mut tx = pool.begin().await?;

    let found: Option<(i64, i64)> = sqlx::query_as(
        "SELECT ag.id, ag.user_id FROM agents ag JOIN users u ON u.id = ag.user_id \
         WHERE u.wallet_address = $1 AND ag.name = $2",
    )
    .bind(update.wallet_address.trim())
    .bind(update.agent_name.trim())
    .fetch_optional(&mut *tx)
    .await?;

    let Some((agent_id, user_id)) = found else {
        return Err(DbError::Conflict(format!(
            "agent '{}' does not exist for this wallet",
            update.agent_name.trim()
        )));
    };

    if let Some(new_name) = update
        .new_agent_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != update.agent_name.trim())
    {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM agents WHERE user_id = $1 AND name = $2)",
        )
        .bind(user_id)
        .bind(new_name)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(DbError::Conflict(format!(
                "an agent named '{new_name}' already exists for this wallet"
            )));
        }
        sqlx::query("UPDATE agents SET name = $2 WHERE id = $1")
            .bind(agent_id)
            .bind(new_name)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(categories) = &update.categories {
        sqlx::query("UPDATE agents SET categories = $2 WHERE id = $1")
            .bind(agent_id)
            .bind(normalized_categories(categories))
            .execute(&mut *tx)
            .await?;
    }

    if !update.remove_accounts.is_empty() {
        let removed: Vec<String> = update
            .remove_accounts
            .iter()
            .map(|h| normalize_handle(h))
            .collect();
        sqlx::query("DELETE FROM agent_accounts WHERE agent_id = $1 AND account_handle = ANY($2)")
            .bind(agent_id)
            .bind(&removed)
            .execute(&mut *tx)
            .await?;
    }

    if !update.add_accounts.is_empty() {
        let refs = normalized_refs(&update.add_accounts);
        let handles: Vec<String> = refs.iter().map(|r| r.username.clone()).collect();
        ensure_accounts_exist(&mut tx, &handles).await?;
        for account in &refs {
            sqlx::query(
                "INSERT INTO agent_accounts (agent_id, account_handle, influence) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (agent_id, account_handle) DO NOTHING",
            )
            .bind(agent_id)
            .bind(&account.username)
            .bind(account.influence)
            .execute(&mut *tx)
            .await?;
        }
    }

    for account in normalized_refs(&update.update_influences) {
        let result = sqlx::query(
            "UPDATE agent_accounts SET influence = $3 WHERE agent_id = $1 AND account_handle = $2",
        )
        .bind(agent_id)
        .bind(&account.username)
        .bind(account.influence)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "account '{}' is not part of this agent",
                account.username
            )));
        }
    }

    sqlx::query("UPDATE agents SET updated_at = NOW() WHERE id = $1")
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    get_agent(pool, agent_id).await
}

/// Delete an agent owned by the given wallet.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if no such agent exists.
pub async fn delete_agent(pool: &PgPool, wallet_address: &str, agent_name: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "DELETE FROM agents ag USING users u \
         WHERE u.id = ag.user_id AND u.wallet_address = $1 AND ag.name = $2",
    )
    .bind(wallet_address.trim())
    .bind(agent_name.trim())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::Conflict(format!(
            "agent '{}' does not exist for this wallet",
            agent_name.trim()
        )));
    }
    Ok(())
}

/// All agents owned by a wallet, with their account references.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_agents_for_wallet(
    pool: &PgPool,
    wallet_address: &str,
) -> Result<Vec<AgentWithAccounts>, DbError> {
    let agents = sqlx::query_as::<_, AgentRow>(&format!(
        "{AGENT_SELECT} WHERE u.wallet_address = $1 ORDER BY ag.name"
    ))
    .bind(wallet_address.trim())
    .fetch_all(pool)
    .await?;

    attach_accounts(pool, agents).await
}

/// Every agent in the system, with account references. Used by aggregation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_all_agents(pool: &PgPool) -> Result<Vec<AgentWithAccounts>, DbError> {
    let agents = sqlx::query_as::<_, AgentRow>(&format!("{AGENT_SELECT} ORDER BY ag.id"))
        .fetch_all(pool)
        .await?;

    attach_accounts(pool, agents).await
}

async fn get_agent(pool: &PgPool, agent_id: i64) -> Result<AgentWithAccounts, DbError> {
    let agent = sqlx::query_as::<_, AgentRow>(&format!("{AGENT_SELECT} WHERE ag.id = $1"))
        .bind(agent_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    attach_accounts(pool, vec![agent])
        .await?
        .pop()
        .ok_or(DbError::NotFound)
}

async fn attach_accounts(
    pool: &PgPool,
    agents: Vec<AgentRow>,
) -> Result<Vec<AgentWithAccounts>, DbError> {
    if agents.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = agents.iter().map(|a| a.id).collect();
    let rows = sqlx::query_as::<_, AgentAccountRow>(
        "SELECT agent_id, account_handle, influence FROM agent_accounts \
         WHERE agent_id = ANY($1) \
         ORDER BY account_handle",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_agent: HashMap<i64, Vec<AccountRef>> = HashMap::new();
    for row in rows {
        by_agent.entry(row.agent_id).or_default().push(AccountRef {
            username: row.account_handle,
            influence: row.influence,
        });
    }

    Ok(agents
        .into_iter()
        .map(|agent| {
            let accounts = by_agent.remove(&agent.id).unwrap_or_default();
            AgentWithAccounts { agent, accounts }
        })
        .collect())
}

async fn ensure_accounts_exist(conn: &mut PgConnection, handles: &[String]) -> Result<(), DbError> {
    if handles.is_empty() {
        return Ok(());
    }

    let found: Vec<String> =
        sqlx::query_scalar("SELECT handle FROM accounts WHERE handle = ANY($1)")
            .bind(handles)
            .fetch_all(&mut *conn)
            .await?;

    let found: BTreeSet<&str> = found.iter().map(String::as_str).collect();
    let missing: Vec<&str> = handles
        .iter()
        .map(String::as_str)
        .filter(|h| !found.contains(h))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DbError::Conflict(format!(
            "unknown accounts (look them up first): {}",
            missing.join(", ")
        )))
    }
}

/// Lowercase handles and drop duplicates, keeping the first occurrence.
fn normalized_refs(accounts: &[AccountRef]) -> Vec<AccountRef> {
    let mut seen = BTreeSet::new();
    accounts
        .iter()
        .filter_map(|a| {
            let username = normalize_handle(&a.username);
            seen.insert(username.clone()).then_some(AccountRef {
                username,
                influence: a.influence,
            })
        })
        .collect()
}

fn normalized_categories(categories: &[String]) -> Vec<String> {
    categories
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_refs_dedupes_by_handle() {
        let refs = normalized_refs(&[
            AccountRef {
                username: "@Alice".into(),
                influence: 80.0,
            },
            AccountRef {
                username: "alice".into(),
                influence: 10.0,
            },
            AccountRef {
                username: "bob".into(),
                influence: 20.0,
            },
        ]);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].username, "alice");
        assert!((refs[0].influence - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn normalized_categories_sorts_and_dedupes() {
        let cats = normalized_categories(&[
            "memecoins".into(),
            " defi ".into(),
            "memecoins".into(),
            String::new(),
        ]);
        assert_eq!(cats, vec!["defi".to_string(), "memecoins".to_string()]);
    }
}
