use rocket::form::Form;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use sqlx::{FromRow, SqlitePool};
use crate::AppConfig;
use crate::db::{store_error_kind, DbPool, StoreErrorKind};
use crate::error::{DeleteOutcome, RegistryError};
use crate::util::{log_registry_error, registry_to_custom_error, require_fields, trimmed, FieldValue, PageMessage};

pub const CODE_MAX_LEN: usize = 5;
pub const NAME_MAX_LEN: usize = 50;
pub const PROGRAM_CODE_MAX_LEN: usize = 50;

#[derive(Serialize, Deserialize, FromRow, Clone, Debug, PartialEq, Eq)]
pub struct Klasse {
    pub code: String,
    pub name: String,
    pub program_code: String,
}

/// Trimmed input of the registration form, echoed back when it is rejected.
#[derive(Serialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct NewKlasse {
    pub code: String,
    pub name: String,
    pub program_code: String,
}
impl NewKlasse {
    pub fn new(code: &str, name: &str, program_code: &str) -> Self {
        Self {
            code: code.trim().to_string(),
            name: name.trim().to_string(),
            program_code: program_code.trim().to_string(),
        }
    }
    fn validate(&self) -> Result<(), RegistryError> {
        require_fields(&[
            FieldValue { label: "Klassekode", value: &self.code, max_len: CODE_MAX_LEN },
            FieldValue { label: "Klassenavn", value: &self.name, max_len: NAME_MAX_LEN },
            FieldValue { label: "Studiumkode", value: &self.program_code, max_len: PROGRAM_CODE_MAX_LEN },
        ])
    }
}

#[derive(Debug, FromForm)]
struct KlasseFormValues {
    #[field(name = "klassekode")]
    code: Option<String>,
    #[field(name = "klassenavn")]
    name: Option<String>,
    #[field(name = "studiumkode")]
    program_code: Option<String>,
}
impl From<KlasseFormValues> for NewKlasse {
    fn from(vals: KlasseFormValues) -> Self {
        Self::new(
            &vals.code.unwrap_or_default(),
            &vals.name.unwrap_or_default(),
            &vals.program_code.unwrap_or_default(),
        )
    }
}

#[derive(Debug, FromForm)]
struct KlasseDeleteValues {
    #[field(name = "klassekode")]
    code: Option<String>,
}

pub async fn create_klasse(pool: &SqlitePool, new: &NewKlasse) -> Result<String, RegistryError> {
    new.validate()?;
    sqlx::query("INSERT INTO klasse (klassekode, klassenavn, studiumkode) VALUES (?, ?, ?)")
        .bind(&new.code)
        .bind(&new.name)
        .bind(&new.program_code)
        .execute(pool)
        .await
        .map_err(|err| match store_error_kind(&err) {
            StoreErrorKind::UniqueViolation => RegistryError::DuplicateKey {
                field: "Klassekode",
                key: new.code.clone(),
            },
            _ => err.into(),
        })?;
    info!("Class created, code: {}", new.code);
    Ok(new.code.clone())
}

pub async fn list_klasse(pool: &SqlitePool) -> Result<Vec<Klasse>, RegistryError> {
    let klasser = sqlx::query_as::<_, Klasse>(
        "SELECT klassekode AS code, klassenavn AS name, studiumkode AS program_code
         FROM klasse
         ORDER BY klassekode")
        .fetch_all(pool)
        .await?;
    Ok(klasser)
}

pub async fn count_students(pool: &SqlitePool, code: &str) -> Result<i64, RegistryError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM student WHERE klassekode = ?")
        .bind(code)
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

/// Refuses to delete a class that students still point at. The count is
/// checked first for the message, the foreign key catches what slips past it.
pub async fn delete_klasse(pool: &SqlitePool, code: &str) -> Result<DeleteOutcome, RegistryError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RegistryError::Validation("Velg en klasse som skal slettes.".to_string()));
    }
    let dependents = count_students(pool, code).await?;
    if dependents > 0 {
        return Err(RegistryError::ReferentialIntegrity {
            code: code.to_string(),
            dependents: Some(dependents),
        });
    }
    let outcome = remove_klasse_row(pool, code).await?;
    if outcome == DeleteOutcome::Deleted {
        info!("Class deleted, code: {code}");
    }
    Ok(outcome)
}

async fn remove_klasse_row(pool: &SqlitePool, code: &str) -> Result<DeleteOutcome, RegistryError> {
    let res = sqlx::query("DELETE FROM klasse WHERE klassekode = ?")
        .bind(code)
        .execute(pool)
        .await
        .map_err(|err| match store_error_kind(&err) {
            StoreErrorKind::ForeignKeyViolation => RegistryError::ReferentialIntegrity {
                code: code.to_string(),
                dependents: None,
            },
            _ => err.into(),
        })?;
    Ok(DeleteOutcome::from_rows_affected(res.rows_affected()))
}

async fn render_klasse_page(message: Option<PageMessage>, form: NewKlasse, cfg: &AppConfig, pool: &SqlitePool) -> Template {
    let (klasser, message) = match list_klasse(pool).await {
        Ok(klasser) => (klasser, message),
        Err(err) => {
            log_registry_error("Listing classes", &err);
            (vec![], Some(PageMessage::from_error(&err)))
        }
    };
    Template::render("klasse", context! {
        title: &cfg.app_title,
        message,
        form,
        klasser,
    })
}

#[get("/klasse")]
async fn get_klasse(cfg: &State<AppConfig>, db: &State<DbPool>) -> Template {
    render_klasse_page(None, NewKlasse::default(), cfg, &db.0).await
}

#[post("/klasse", data = "<form>")]
async fn post_klasse(form: Form<KlasseFormValues>, cfg: &State<AppConfig>, db: &State<DbPool>) -> Template {
    let new = NewKlasse::from(form.into_inner());
    match create_klasse(&db.0, &new).await {
        Ok(code) => {
            let message = PageMessage::ok(format!("Klasse «{code}» ble registrert."));
            render_klasse_page(Some(message), NewKlasse::default(), cfg, &db.0).await
        }
        Err(err) => {
            log_registry_error("Class registration", &err);
            render_klasse_page(Some(PageMessage::from_error(&err)), new, cfg, &db.0).await
        }
    }
}

#[post("/klasse/slett", data = "<form>")]
async fn post_klasse_slett(form: Form<KlasseDeleteValues>, cfg: &State<AppConfig>, db: &State<DbPool>) -> Template {
    let code = trimmed(form.into_inner().code);
    let message = match delete_klasse(&db.0, &code).await {
        Ok(outcome) => PageMessage::from_delete(
            outcome,
            format!("Klassen «{code}» ble slettet."),
            format!("Fant ingen klasse med kode «{code}»."),
        ),
        Err(err) => {
            log_registry_error("Class deletion", &err);
            PageMessage::from_error(&err)
        }
    };
    render_klasse_page(Some(message), NewKlasse::default(), cfg, &db.0).await
}

#[get("/api/klasse")]
async fn get_api_klasse(db: &State<DbPool>) -> Result<Json<Vec<Klasse>>, Custom<String>> {
    let klasser = list_klasse(&db.0).await.map_err(registry_to_custom_error)?;
    Ok(Json(klasser))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_klasse,
            post_klasse,
            post_klasse_slett,
            get_api_klasse,
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test::memory_pool;
    use crate::student::{create_student, NewStudent};

    fn it1() -> NewKlasse {
        NewKlasse::new("IT1", "Informatikk 1", "IT")
    }

    #[rocket::async_test]
    async fn created_class_is_listed_once() {
        let pool = memory_pool().await;
        assert_eq!(create_klasse(&pool, &it1()).await, Ok("IT1".to_string()));
        let klasser = list_klasse(&pool).await.unwrap();
        assert_eq!(klasser, vec![Klasse {
            code: "IT1".to_string(),
            name: "Informatikk 1".to_string(),
            program_code: "IT".to_string(),
        }]);
    }

    #[rocket::async_test]
    async fn input_is_trimmed_before_storing() {
        let pool = memory_pool().await;
        let code = create_klasse(&pool, &NewKlasse::new("  IT2 ", " Informatikk 2 ", "IT ")).await.unwrap();
        assert_eq!(code, "IT2");
        let klasser = list_klasse(&pool).await.unwrap();
        assert_eq!(klasser[0].name, "Informatikk 2");
    }

    #[rocket::async_test]
    async fn blank_fields_are_rejected() {
        let pool = memory_pool().await;
        let err = create_klasse(&pool, &NewKlasse::new("IT1", "   ", "IT")).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(list_klasse(&pool).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn too_long_code_is_rejected() {
        let pool = memory_pool().await;
        let err = create_klasse(&pool, &NewKlasse::new("IT1234", "Informatikk", "IT")).await.unwrap_err();
        assert_eq!(err, RegistryError::Validation("Klassekode kan ha maks 5 tegn.".to_string()));
    }

    #[rocket::async_test]
    async fn duplicate_code_keeps_single_row() {
        let pool = memory_pool().await;
        create_klasse(&pool, &it1()).await.unwrap();
        let err = create_klasse(&pool, &NewKlasse::new("IT1", "Annet navn", "X")).await.unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey { field: "Klassekode", key: "IT1".to_string() });
        let klasser = list_klasse(&pool).await.unwrap();
        assert_eq!(klasser.iter().filter(|k| k.code == "IT1").count(), 1);
        assert_eq!(klasser[0].name, "Informatikk 1");
    }

    #[rocket::async_test]
    async fn listing_is_ordered_by_code() {
        let pool = memory_pool().await;
        for code in ["IT3", "AB1", "IT1"] {
            create_klasse(&pool, &NewKlasse::new(code, "Navn", "IT")).await.unwrap();
        }
        let codes = list_klasse(&pool).await.unwrap().into_iter().map(|k| k.code).collect::<Vec<_>>();
        assert_eq!(codes, vec!["AB1", "IT1", "IT3"]);
    }

    #[rocket::async_test]
    async fn referenced_class_is_not_deleted() {
        let pool = memory_pool().await;
        create_klasse(&pool, &it1()).await.unwrap();
        for username in ["ab123", "cd456"] {
            create_student(&pool, &NewStudent::new(username, "Ada", "Lovelace", "IT1")).await.unwrap();
        }
        let err = delete_klasse(&pool, "IT1").await.unwrap_err();
        assert_eq!(err, RegistryError::ReferentialIntegrity { code: "IT1".to_string(), dependents: Some(2) });
        assert_eq!(list_klasse(&pool).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn unreferenced_class_is_deleted() {
        let pool = memory_pool().await;
        create_klasse(&pool, &it1()).await.unwrap();
        assert_eq!(delete_klasse(&pool, "IT1").await, Ok(DeleteOutcome::Deleted));
        assert!(list_klasse(&pool).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn deleting_missing_class_is_not_found_every_time() {
        let pool = memory_pool().await;
        assert_eq!(delete_klasse(&pool, "XYZ").await, Ok(DeleteOutcome::NotFound));
        assert_eq!(delete_klasse(&pool, "XYZ").await, Ok(DeleteOutcome::NotFound));
    }

    #[rocket::async_test]
    async fn store_rejects_delete_that_slips_past_the_count() {
        let pool = memory_pool().await;
        create_klasse(&pool, &it1()).await.unwrap();
        create_student(&pool, &NewStudent::new("ab123", "Ada", "Lovelace", "IT1")).await.unwrap();
        let err = remove_klasse_row(&pool, "IT1").await.unwrap_err();
        assert_eq!(err, RegistryError::ReferentialIntegrity { code: "IT1".into(), dependents: None });
        assert_eq!(err.kind(), "ReferentialIntegrityError");
        assert!(err.to_string().contains("studenter peker på den"));
        assert_eq!(list_klasse(&pool).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn removing_unreferenced_row_reports_outcome() {
        let pool = memory_pool().await;
        create_klasse(&pool, &it1()).await.unwrap();
        assert_eq!(remove_klasse_row(&pool, "IT1").await, Ok(DeleteOutcome::Deleted));
        assert_eq!(remove_klasse_row(&pool, "IT1").await, Ok(DeleteOutcome::NotFound));
    }
}
