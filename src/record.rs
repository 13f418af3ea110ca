//! Storage for the upset records served by the HTTP API.

use {
    sqlx::{
        ConnectOptions as _,
        Sqlite,
        SqlitePool,
        Transaction,
        sqlite::{
            SqliteConnectOptions,
            SqlitePoolOptions,
        },
    },
    crate::{
        prelude::*,
        seed_rank::Seed,
        upset::upset_factor,
    },
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS upsets (
        id INTEGER PRIMARY KEY,
        winner TEXT NOT NULL,
        loser TEXT NOT NULL,
        winner_seed INTEGER NOT NULL,
        loser_seed INTEGER NOT NULL,
        upset_factor INTEGER NOT NULL,
        tournament TEXT NOT NULL,
        winner_score INTEGER NOT NULL,
        loser_score INTEGER NOT NULL
    )
";

const COLUMNS: &str = "id, winner, loser, winner_seed, loser_seed, tournament, winner_score, loser_score, upset_factor";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("an upset with ID {0} already exists")]
    DuplicateId(i64),
    #[error("seeds must be positive, got {0}")]
    InvalidSeed(i64),
}

pub(crate) async fn connect(path: &Path) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));
    let pool = SqlitePoolOptions::default()
        .max_connections(16)
        .connect_with(options)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

pub(crate) async fn create_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}

/// An upset as submitted by API clients. The upset factor is always computed here, never taken from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct UpsetInput {
    pub(crate) id: i64,
    pub(crate) winner: String,
    pub(crate) loser: String,
    pub(crate) winner_seed: i64,
    pub(crate) loser_seed: i64,
    pub(crate) tournament: String,
    pub(crate) winner_score: i64,
    pub(crate) loser_score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Upset {
    pub(crate) id: i64,
    pub(crate) winner: String,
    pub(crate) loser: String,
    pub(crate) winner_seed: i64,
    pub(crate) loser_seed: i64,
    pub(crate) tournament: String,
    pub(crate) winner_score: i64,
    pub(crate) loser_score: i64,
    pub(crate) upset_factor: i64,
}

impl TryFrom<UpsetInput> for Upset {
    type Error = Error;

    fn try_from(UpsetInput { id, winner, loser, winner_seed, loser_seed, tournament, winner_score, loser_score }: UpsetInput) -> Result<Self, Error> {
        let winner_rank = Seed::new(winner_seed).ok_or(Error::InvalidSeed(winner_seed))?;
        let loser_rank = Seed::new(loser_seed).ok_or(Error::InvalidSeed(loser_seed))?;
        Ok(Self {
            upset_factor: upset_factor(winner_rank, loser_rank),
            id, winner, loser, winner_seed, loser_seed, tournament, winner_score, loser_score,
        })
    }
}

fn duplicate_id(e: sqlx::Error, id: i64) -> Error {
    match e {
        sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => Error::DuplicateId(id),
        e => Error::Sql(e),
    }
}

impl Upset {
    pub(crate) async fn from_id(transaction: &mut Transaction<'_, Sqlite>, id: i64) -> sqlx::Result<Option<Self>> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM upsets WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut **transaction)
            .await
    }

    pub(crate) async fn with_winner(transaction: &mut Transaction<'_, Sqlite>, winner: &str) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM upsets WHERE winner = ? ORDER BY id"))
            .bind(winner)
            .fetch_all(&mut **transaction)
            .await
    }

    pub(crate) async fn with_loser(transaction: &mut Transaction<'_, Sqlite>, loser: &str) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM upsets WHERE loser = ? ORDER BY id"))
            .bind(loser)
            .fetch_all(&mut **transaction)
            .await
    }

    pub(crate) async fn in_tournament(transaction: &mut Transaction<'_, Sqlite>, tournament: &str) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM upsets WHERE tournament = ? ORDER BY id"))
            .bind(tournament)
            .fetch_all(&mut **transaction)
            .await
    }

    pub(crate) async fn insert(transaction: &mut Transaction<'_, Sqlite>, input: UpsetInput) -> Result<Self, Error> {
        let upset = Self::try_from(input)?;
        sqlx::query("INSERT INTO upsets (id, winner, loser, winner_seed, loser_seed, upset_factor, tournament, winner_score, loser_score) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(upset.id)
            .bind(&upset.winner)
            .bind(&upset.loser)
            .bind(upset.winner_seed)
            .bind(upset.loser_seed)
            .bind(upset.upset_factor)
            .bind(&upset.tournament)
            .bind(upset.winner_score)
            .bind(upset.loser_score)
            .execute(&mut **transaction)
            .await
            .map_err(|e| duplicate_id(e, upset.id))?;
        Ok(upset)
    }

    /// Replaces the upset with the given ID, which may change the ID itself. Returns `None` if there was no such upset.
    pub(crate) async fn update(transaction: &mut Transaction<'_, Sqlite>, id: i64, input: UpsetInput) -> Result<Option<Self>, Error> {
        let upset = Self::try_from(input)?;
        let rows_affected = sqlx::query("UPDATE upsets SET id = ?, winner = ?, loser = ?, winner_seed = ?, loser_seed = ?, upset_factor = ?, tournament = ?, winner_score = ?, loser_score = ? WHERE id = ?")
            .bind(upset.id)
            .bind(&upset.winner)
            .bind(&upset.loser)
            .bind(upset.winner_seed)
            .bind(upset.loser_seed)
            .bind(upset.upset_factor)
            .bind(&upset.tournament)
            .bind(upset.winner_score)
            .bind(upset.loser_score)
            .bind(id)
            .execute(&mut **transaction)
            .await
            .map_err(|e| duplicate_id(e, upset.id))?
            .rows_affected();
        Ok((rows_affected > 0).then_some(upset))
    }

    /// Returns whether an upset was deleted.
    pub(crate) async fn delete(transaction: &mut Transaction<'_, Sqlite>, id: i64) -> sqlx::Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM upsets WHERE id = ?")
            .bind(id)
            .execute(&mut **transaction)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // a single connection that never expires, since every connection to `:memory:` is its own database
    let pool = SqlitePoolOptions::default()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: i64, winner_seed: i64, loser_seed: i64) -> UpsetInput {
        UpsetInput {
            id,
            winner: format!("B"),
            loser: format!("A"),
            winner_seed,
            loser_seed,
            tournament: format!("Genesis"),
            winner_score: 3,
            loser_score: 1,
        }
    }

    #[test]
    fn factor_is_computed_from_seeds() {
        assert_eq!(Upset::try_from(input(1, 2, 1)).unwrap().upset_factor, 1);
        assert_eq!(Upset::try_from(input(1, 65, 1)).unwrap().upset_factor, 12);
        assert_eq!(Upset::try_from(input(1, 1, 65)).unwrap().upset_factor, -12);
        assert!(matches!(Upset::try_from(input(1, 0, 1)), Err(Error::InvalidSeed(0))));
    }

    #[tokio::test]
    async fn insert_then_query() {
        let pool = memory_pool().await;
        let mut transaction = pool.begin().await.unwrap();
        let inserted = Upset::insert(&mut transaction, input(7, 17, 9)).await.unwrap();
        assert_eq!(inserted.upset_factor, 2);
        assert_eq!(Upset::from_id(&mut transaction, 7).await.unwrap(), Some(inserted.clone()));
        assert_eq!(Upset::with_winner(&mut transaction, "B").await.unwrap(), [inserted.clone()]);
        assert_eq!(Upset::with_loser(&mut transaction, "A").await.unwrap(), [inserted.clone()]);
        assert_eq!(Upset::in_tournament(&mut transaction, "Genesis").await.unwrap(), [inserted]);
        assert!(Upset::with_winner(&mut transaction, "A").await.unwrap().is_empty());
        transaction.commit().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let pool = memory_pool().await;
        let mut transaction = pool.begin().await.unwrap();
        Upset::insert(&mut transaction, input(1, 2, 1)).await.unwrap();
        assert!(matches!(Upset::insert(&mut transaction, input(1, 3, 1)).await, Err(Error::DuplicateId(1))));
    }

    #[tokio::test]
    async fn update_recomputes_factor_and_can_move_ids() {
        let pool = memory_pool().await;
        let mut transaction = pool.begin().await.unwrap();
        Upset::insert(&mut transaction, input(1, 2, 1)).await.unwrap();
        let updated = Upset::update(&mut transaction, 1, input(5, 33, 1)).await.unwrap().unwrap();
        assert_eq!(updated.upset_factor, 10);
        assert_eq!(Upset::from_id(&mut transaction, 1).await.unwrap(), None);
        assert_eq!(Upset::from_id(&mut transaction, 5).await.unwrap(), Some(updated));
        assert_eq!(Upset::update(&mut transaction, 1, input(1, 2, 1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let pool = memory_pool().await;
        let mut transaction = pool.begin().await.unwrap();
        Upset::insert(&mut transaction, input(1, 2, 1)).await.unwrap();
        assert!(Upset::delete(&mut transaction, 1).await.unwrap());
        assert!(!Upset::delete(&mut transaction, 1).await.unwrap());
    }
}
