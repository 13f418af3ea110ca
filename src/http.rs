//! JSON API over the stored upset records.

use {
    rocket::{
        Build,
        Request,
        Rocket,
        State,
        config::LogLevel,
        http::Status,
        response::{
            self,
            Responder,
        },
        serde::json::Json,
    },
    sqlx::SqlitePool,
    crate::{
        prelude::*,
        record::{
            self,
            Upset,
            UpsetInput,
        },
    },
};

#[derive(rocket::Responder)]
pub(crate) enum StatusOrError<E> {
    Status(Status),
    Err(E),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Record(#[from] record::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
}

impl<E: Into<Error>> From<E> for StatusOrError<Error> {
    fn from(e: E) -> Self {
        Self::Err(e.into())
    }
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = match &self {
            Self::Record(record::Error::DuplicateId(_)) => Status::Conflict,
            Self::Record(record::Error::InvalidSeed(_)) => Status::UnprocessableEntity,
            Self::Record(record::Error::Sql(_)) | Self::Sql(_) => {
                log::error!("internal server error: {self} ({self:?})");
                return Err(Status::InternalServerError)
            }
        };
        (status, Json(Detail { detail: self.to_string() })).respond_to(request)
    }
}

#[derive(Debug, Serialize)]
struct Detail {
    detail: String,
}

#[derive(Debug, Serialize)]
struct Message {
    message: &'static str,
}

fn non_empty(upsets: Vec<Upset>) -> Result<Json<Vec<Upset>>, StatusOrError<Error>> {
    if upsets.is_empty() {
        Err(StatusOrError::Status(Status::NotFound))
    } else {
        Ok(Json(upsets))
    }
}

#[rocket::get("/sets/<id>")]
async fn get_set(pool: &State<SqlitePool>, id: i64) -> Result<Json<Upset>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    let upset = Upset::from_id(&mut transaction, id).await?.ok_or(StatusOrError::Status(Status::NotFound))?;
    transaction.commit().await?;
    Ok(Json(upset))
}

#[rocket::get("/sets/winner/<winner>")]
async fn sets_by_winner(pool: &State<SqlitePool>, winner: &str) -> Result<Json<Vec<Upset>>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    let upsets = Upset::with_winner(&mut transaction, winner).await?;
    transaction.commit().await?;
    non_empty(upsets)
}

#[rocket::get("/sets/loser/<loser>")]
async fn sets_by_loser(pool: &State<SqlitePool>, loser: &str) -> Result<Json<Vec<Upset>>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    let upsets = Upset::with_loser(&mut transaction, loser).await?;
    transaction.commit().await?;
    non_empty(upsets)
}

#[rocket::get("/sets/tournament/<tournament>")]
async fn sets_by_tournament(pool: &State<SqlitePool>, tournament: &str) -> Result<Json<Vec<Upset>>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    let upsets = Upset::in_tournament(&mut transaction, tournament).await?;
    transaction.commit().await?;
    non_empty(upsets)
}

#[rocket::post("/sets", data = "<upset>")]
async fn create_set(pool: &State<SqlitePool>, upset: Json<UpsetInput>) -> Result<Json<Upset>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    let upset = Upset::insert(&mut transaction, upset.into_inner()).await?;
    transaction.commit().await?;
    log::info!("stored upset {}: {} over {} at {}", upset.id, upset.winner, upset.loser, upset.tournament);
    Ok(Json(upset))
}

#[rocket::put("/sets/<id>", data = "<upset>")]
async fn update_set(pool: &State<SqlitePool>, id: i64, upset: Json<UpsetInput>) -> Result<Json<Upset>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    let upset = Upset::update(&mut transaction, id, upset.into_inner()).await?.ok_or(StatusOrError::Status(Status::NotFound))?;
    transaction.commit().await?;
    Ok(Json(upset))
}

#[rocket::delete("/sets/<id>")]
async fn delete_set(pool: &State<SqlitePool>, id: i64) -> Result<Json<Message>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await?;
    if !Upset::delete(&mut transaction, id).await? {
        return Err(StatusOrError::Status(Status::NotFound))
    }
    transaction.commit().await?;
    Ok(Json(Message { message: "Upset deleted successfully!" }))
}

#[rocket::catch(404)]
fn not_found(request: &Request<'_>) -> Json<Detail> {
    Json(Detail {
        detail: if request.route().is_some() { format!("Upset not found") } else { format!("Not Found") },
    })
}

#[rocket::catch(default)]
fn fallback_catcher(status: Status, request: &Request<'_>) -> Json<Detail> {
    log::debug!("responding with HTTP status code {} {} to request {request:?}", status.code, status.reason_lossy());
    Json(Detail { detail: status.reason_lossy().to_owned() })
}

pub(crate) fn rocket(pool: SqlitePool, port: u16) -> Rocket<Build> {
    rocket::custom(rocket::Config {
        log_level: LogLevel::Critical,
        port,
        ..rocket::Config::default()
    })
    .mount("/", rocket::routes![
        get_set,
        sets_by_winner,
        sets_by_loser,
        sets_by_tournament,
        create_set,
        update_set,
        delete_set,
    ])
    .register("/", rocket::catchers![
        not_found,
        fallback_catcher,
    ])
    .manage(pool)
}

#[cfg(test)]
mod tests {
    use {
        rocket::{
            http::ContentType,
            local::asynchronous::Client,
        },
        serde_json::{
            Value,
            json,
        },
        super::*,
    };

    async fn client() -> Client {
        Client::tracked(rocket(record::memory_pool().await, 0)).await.unwrap()
    }

    fn body(id: i64, winner: &str, loser: &str, winner_seed: i64, loser_seed: i64) -> Value {
        json!({
            "Id": id,
            "Winner": winner,
            "Loser": loser,
            "WinnerSeed": winner_seed,
            "LoserSeed": loser_seed,
            "Tournament": "Genesis",
            "WinnerScore": 3,
            "LoserScore": 2,
        })
    }

    #[rocket::async_test]
    async fn create_then_get() {
        let client = client().await;
        let response = client.post("/sets/").json(&body(1, "B", "A", 65, 1)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let created = response.into_json::<Upset>().await.unwrap();
        assert_eq!(created.upset_factor, 12);
        let response = client.get("/sets/1").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_json::<Value>().await.unwrap(), json!({
            "Id": 1,
            "Winner": "B",
            "Loser": "A",
            "WinnerSeed": 65,
            "LoserSeed": 1,
            "Tournament": "Genesis",
            "WinnerScore": 3,
            "LoserScore": 2,
            "UpsetFactor": 12,
        }));
    }

    #[rocket::async_test]
    async fn create_accepts_both_collection_paths() {
        let client = client().await;
        assert_eq!(client.post("/sets/").json(&body(1, "B", "A", 2, 1)).dispatch().await.status(), Status::Ok);
        assert_eq!(client.post("/sets").json(&body(2, "B", "A", 2, 1)).dispatch().await.status(), Status::Ok);
        assert_eq!(client.get("/sets/2").dispatch().await.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn client_supplied_factor_is_ignored() {
        let client = client().await;
        let mut upset = body(1, "B", "A", 2, 1);
        upset["UpsetFactor"] = json!(99);
        let created = client.post("/sets/").json(&upset).dispatch().await.into_json::<Upset>().await.unwrap();
        assert_eq!(created.upset_factor, 1);
    }

    #[rocket::async_test]
    async fn missing_record() {
        let client = client().await;
        let response = client.get("/sets/404").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.into_json::<Value>().await.unwrap(), json!({ "detail": "Upset not found" }));
    }

    #[rocket::async_test]
    async fn duplicate_id_conflicts() {
        let client = client().await;
        assert_eq!(client.post("/sets/").json(&body(1, "B", "A", 2, 1)).dispatch().await.status(), Status::Ok);
        let response = client.post("/sets/").json(&body(1, "C", "D", 3, 1)).dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
        assert!(response.into_json::<Value>().await.unwrap()["detail"].is_string());
    }

    #[rocket::async_test]
    async fn invalid_input_is_rejected() {
        let client = client().await;
        assert_eq!(client.post("/sets/").json(&body(1, "B", "A", 0, 1)).dispatch().await.status(), Status::UnprocessableEntity);
        let response = client.post("/sets/").header(ContentType::JSON).body(r#"{"Id": 1}"#).dispatch().await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        assert!(response.into_json::<Value>().await.unwrap()["detail"].is_string());
    }

    #[rocket::async_test]
    async fn list_endpoints() {
        let client = client().await;
        client.post("/sets/").json(&body(1, "B", "A", 2, 1)).dispatch().await;
        client.post("/sets/").json(&body(2, "B", "C", 9, 3)).dispatch().await;
        let by_winner = client.get("/sets/winner/B").dispatch().await.into_json::<Vec<Upset>>().await.unwrap();
        assert_eq!(by_winner.iter().map(|upset| upset.id).collect::<Vec<_>>(), [1, 2]);
        let by_loser = client.get("/sets/loser/C").dispatch().await.into_json::<Vec<Upset>>().await.unwrap();
        assert_eq!(by_loser.iter().map(|upset| upset.id).collect::<Vec<_>>(), [2]);
        let by_tournament = client.get("/sets/tournament/Genesis").dispatch().await.into_json::<Vec<Upset>>().await.unwrap();
        assert_eq!(by_tournament.len(), 2);
        assert_eq!(client.get("/sets/winner/A").dispatch().await.status(), Status::NotFound);
        assert_eq!(client.get("/sets/tournament/Evo").dispatch().await.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn update_recomputes_factor() {
        let client = client().await;
        client.post("/sets/").json(&body(1, "B", "A", 2, 1)).dispatch().await;
        let response = client.put("/sets/1").json(&body(1, "B", "A", 33, 1)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_json::<Upset>().await.unwrap().upset_factor, 10);
        assert_eq!(client.put("/sets/2").json(&body(2, "B", "A", 2, 1)).dispatch().await.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn delete_then_missing() {
        let client = client().await;
        client.post("/sets/").json(&body(1, "B", "A", 2, 1)).dispatch().await;
        let response = client.delete("/sets/1").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_json::<Value>().await.unwrap(), json!({ "message": "Upset deleted successfully!" }));
        assert_eq!(client.delete("/sets/1").dispatch().await.status(), Status::NotFound);
        assert_eq!(client.get("/sets/1").dispatch().await.status(), Status::NotFound);
    }
}
