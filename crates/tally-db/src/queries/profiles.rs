//! Profile query functions. Only the payout wallet is read by settlement.

use rusqlite::{Connection, OptionalExtension};

use crate::{now_secs, DbError, Result};

/// Insert or update a profile row.
pub fn upsert(conn: &Connection, user_id: &str, username: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO profiles (user_id, username, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET
             username = COALESCE(excluded.username, profiles.username),
             updated_at = excluded.updated_at",
        rusqlite::params![user_id, username, now_secs()],
    )?;
    Ok(())
}

/// Set (or clear) a user's payout wallet address.
pub fn set_payout_wallet(conn: &Connection, user_id: &str, wallet: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE profiles SET payout_wallet_address = ?2, updated_at = ?3 WHERE user_id = ?1",
        rusqlite::params![user_id, wallet, now_secs()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("profile {user_id}")));
    }
    Ok(())
}

/// A user's payout wallet address. Errors with `NotFound` when the profile
/// does not exist; `None` means the profile has no wallet configured.
pub fn payout_wallet(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT payout_wallet_address FROM profiles WHERE user_id = ?1",
        [user_id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("profile {user_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_lifecycle() {
        let conn = crate::open_memory().expect("open");
        assert!(matches!(payout_wallet(&conn, "alice"), Err(DbError::NotFound(_))));

        upsert(&conn, "alice", Some("alice")).expect("upsert");
        assert_eq!(payout_wallet(&conn, "alice").expect("wallet"), None);

        set_payout_wallet(&conn, "alice", Some("WaLLet")).expect("set");
        assert_eq!(payout_wallet(&conn, "alice").expect("wallet").as_deref(), Some("WaLLet"));

        // Re-upserting must not clear the wallet.
        upsert(&conn, "alice", None).expect("upsert");
        assert_eq!(payout_wallet(&conn, "alice").expect("wallet").as_deref(), Some("WaLLet"));
    }

    #[test]
    fn test_set_wallet_unknown_profile() {
        let conn = crate::open_memory().expect("open");
        assert!(matches!(
            set_payout_wallet(&conn, "ghost", Some("x")),
            Err(DbError::NotFound(_))
        ));
    }
}
