use rand::Rng;
use sqlx::{FromRow, PgPool};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Fixed-width numeric code, uniform over 000000..=999999.
pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..=999_999u32))
}

#[derive(Debug, FromRow)]
struct OtpRow {
    code: String,
    expires_at: OffsetDateTime,
}

/// What `verify` should do with the ledger row it locked.
#[derive(Debug)]
enum Verdict {
    /// Code matches and is live: consume the row and succeed.
    Consume,
    /// Row is past its expiry: remove it and fail.
    Purge(AuthError),
    /// Leave the row in place and fail (wrong guess keeps the code live).
    Keep(AuthError),
}

fn judge(row: Option<&OtpRow>, code: &str, now: OffsetDateTime) -> Verdict {
    match row {
        None => Verdict::Keep(AuthError::NotRequested),
        Some(row) if now > row.expires_at => Verdict::Purge(AuthError::Expired),
        Some(row) if row.code != code => Verdict::Keep(AuthError::Mismatch),
        Some(_) => Verdict::Consume,
    }
}

/// Stores a fresh code for `email`, superseding any prior one. The primary
/// key on email plus the upsert keep "at most one live code per address"
/// true under concurrent issuance.
pub async fn issue(db: &PgPool, email: &str, code: &str, ttl_minutes: i64) -> AuthResult<()> {
    let expires_at = OffsetDateTime::now_utc() + TimeDuration::minutes(ttl_minutes);
    sqlx::query(
        r#"
        INSERT INTO otp_codes (email, code, expires_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (email)
        DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
        "#,
    )
    .bind(email)
    .bind(code)
    .bind(expires_at)
    .execute(db)
    .await?;
    debug!(%email, "otp issued");
    Ok(())
}

/// Read-check-delete as one transaction. The row lock means two concurrent
/// verifies of the same code cannot both succeed: the loser sees either a
/// locked row and waits, or no row at all.
pub async fn verify(db: &PgPool, email: &str, code: &str) -> AuthResult<()> {
    let mut tx = db.begin().await?;

    let row: Option<OtpRow> =
        sqlx::query_as(r#"SELECT code, expires_at FROM otp_codes WHERE email = $1 FOR UPDATE"#)
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;

    match judge(row.as_ref(), code, OffsetDateTime::now_utc()) {
        Verdict::Consume => {
            sqlx::query("DELETE FROM otp_codes WHERE email = $1")
                .bind(email)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            debug!(%email, "otp consumed");
            Ok(())
        }
        Verdict::Purge(err) => {
            sqlx::query("DELETE FROM otp_codes WHERE email = $1")
                .bind(email)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Err(err)
        }
        Verdict::Keep(err) => {
            tx.rollback().await?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, expires_in_secs: i64) -> OtpRow {
        OtpRow {
            code: code.into(),
            expires_at: OffsetDateTime::now_utc() + TimeDuration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn no_row_means_not_requested() {
        let v = judge(None, "123456", OffsetDateTime::now_utc());
        assert!(matches!(v, Verdict::Keep(AuthError::NotRequested)));
    }

    #[test]
    fn expired_row_is_purged() {
        let r = row("123456", -1);
        let v = judge(Some(&r), "123456", OffsetDateTime::now_utc());
        assert!(matches!(v, Verdict::Purge(AuthError::Expired)));
    }

    #[test]
    fn wrong_guess_keeps_the_code_live() {
        let r = row("123456", 300);
        let v = judge(Some(&r), "654321", OffsetDateTime::now_utc());
        assert!(matches!(v, Verdict::Keep(AuthError::Mismatch)));
    }

    #[test]
    fn matching_live_code_is_consumed() {
        let r = row("123456", 300);
        let v = judge(Some(&r), "123456", OffsetDateTime::now_utc());
        assert!(matches!(v, Verdict::Consume));
    }

    #[test]
    fn expiry_wins_over_match() {
        // A correct guess on a dead code is still Expired, and the row goes.
        let r = row("123456", -60);
        let v = judge(Some(&r), "123456", OffsetDateTime::now_utc());
        assert!(matches!(v, Verdict::Purge(AuthError::Expired)));
    }
}
