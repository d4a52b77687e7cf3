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
use crate::klasse::{list_klasse, Klasse, CODE_MAX_LEN};
use crate::util::{log_registry_error, registry_to_custom_error, require_fields, trimmed, FieldValue, PageMessage};

pub const USERNAME_MAX_LEN: usize = 50;
pub const PERSON_NAME_MAX_LEN: usize = 100;

/// Listing row. `class_name` is `None` when the class row is gone.
#[derive(Serialize, Deserialize, FromRow, Clone, Debug, PartialEq, Eq)]
pub struct StudentRow {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub class_code: String,
    pub class_name: Option<String>,
}

#[derive(Serialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct NewStudent {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub class_code: String,
}
impl NewStudent {
    pub fn new(username: &str, first_name: &str, last_name: &str, class_code: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            class_code: class_code.trim().to_string(),
        }
    }
    fn validate(&self) -> Result<(), RegistryError> {
        require_fields(&[
            FieldValue { label: "Brukernavn", value: &self.username, max_len: USERNAME_MAX_LEN },
            FieldValue { label: "Fornavn", value: &self.first_name, max_len: PERSON_NAME_MAX_LEN },
            FieldValue { label: "Etternavn", value: &self.last_name, max_len: PERSON_NAME_MAX_LEN },
            FieldValue { label: "Klassekode", value: &self.class_code, max_len: CODE_MAX_LEN },
        ])
    }
}

#[derive(Debug, FromForm)]
struct StudentFormValues {
    #[field(name = "brukernavn")]
    username: Option<String>,
    #[field(name = "fornavn")]
    first_name: Option<String>,
    #[field(name = "etternavn")]
    last_name: Option<String>,
    #[field(name = "klassekode")]
    class_code: Option<String>,
}
impl From<StudentFormValues> for NewStudent {
    fn from(vals: StudentFormValues) -> Self {
        Self::new(
            &vals.username.unwrap_or_default(),
            &vals.first_name.unwrap_or_default(),
            &vals.last_name.unwrap_or_default(),
            &vals.class_code.unwrap_or_default(),
        )
    }
}

#[derive(Debug, FromForm)]
struct StudentDeleteValues {
    #[field(name = "brukernavn")]
    username: Option<String>,
}

/// Class dropdown entry of the registration form.
#[derive(Serialize, Debug)]
struct KlasseOption {
    code: String,
    name: String,
    selected: bool,
}

pub async fn create_student(pool: &SqlitePool, new: &NewStudent) -> Result<String, RegistryError> {
    new.validate()?;
    sqlx::query("INSERT INTO student (brukernavn, fornavn, etternavn, klassekode) VALUES (?, ?, ?, ?)")
        .bind(&new.username)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.class_code)
        .execute(pool)
        .await
        .map_err(|err| match store_error_kind(&err) {
            StoreErrorKind::UniqueViolation => RegistryError::DuplicateKey {
                field: "Brukernavn",
                key: new.username.clone(),
            },
            StoreErrorKind::ForeignKeyViolation => RegistryError::ForeignKey(new.class_code.clone()),
            StoreErrorKind::Other => err.into(),
        })?;
    info!("Student created, username: {}, class: {}", new.username, new.class_code);
    Ok(new.username.clone())
}

pub async fn list_students(pool: &SqlitePool) -> Result<Vec<StudentRow>, RegistryError> {
    let students = sqlx::query_as::<_, StudentRow>(
        "SELECT s.brukernavn AS username, s.fornavn AS first_name, s.etternavn AS last_name,
                s.klassekode AS class_code, k.klassenavn AS class_name
         FROM student s
         LEFT JOIN klasse k ON k.klassekode = s.klassekode
         ORDER BY s.brukernavn")
        .fetch_all(pool)
        .await?;
    Ok(students)
}

pub async fn delete_student(pool: &SqlitePool, username: &str) -> Result<DeleteOutcome, RegistryError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(RegistryError::Validation("Velg en student som skal slettes.".to_string()));
    }
    let res = sqlx::query("DELETE FROM student WHERE brukernavn = ?")
        .bind(username)
        .execute(pool)
        .await?;
    let outcome = DeleteOutcome::from_rows_affected(res.rows_affected());
    if outcome == DeleteOutcome::Deleted {
        info!("Student deleted, username: {username}");
    }
    Ok(outcome)
}

fn klasse_options(klasser: Vec<Klasse>, selected: &str) -> Vec<KlasseOption> {
    klasser.into_iter().map(|k| KlasseOption {
        selected: k.code == selected,
        code: k.code,
        name: k.name,
    }).collect()
}

async fn render_student_page(message: Option<PageMessage>, form: NewStudent, cfg: &AppConfig, pool: &SqlitePool) -> Template {
    let listings = match list_klasse(pool).await {
        Ok(klasser) => list_students(pool).await.map(|students| (klasser, students)),
        Err(err) => Err(err),
    };
    let (klasser, students, message) = match listings {
        Ok((klasser, students)) => (klasse_options(klasser, &form.class_code), students, message),
        Err(err) => {
            log_registry_error("Listing students", &err);
            (vec![], vec![], Some(PageMessage::from_error(&err)))
        }
    };
    Template::render("student", context! {
        title: &cfg.app_title,
        message,
        form,
        klasser,
        students,
    })
}

#[get("/student")]
async fn get_student(cfg: &State<AppConfig>, db: &State<DbPool>) -> Template {
    render_student_page(None, NewStudent::default(), cfg, &db.0).await
}

#[post("/student", data = "<form>")]
async fn post_student(form: Form<StudentFormValues>, cfg: &State<AppConfig>, db: &State<DbPool>) -> Template {
    let new = NewStudent::from(form.into_inner());
    match create_student(&db.0, &new).await {
        Ok(username) => {
            let message = PageMessage::ok(format!("Student «{username}» ble registrert."));
            render_student_page(Some(message), NewStudent::default(), cfg, &db.0).await
        }
        Err(err) => {
            log_registry_error("Student registration", &err);
            render_student_page(Some(PageMessage::from_error(&err)), new, cfg, &db.0).await
        }
    }
}

#[post("/student/slett", data = "<form>")]
async fn post_student_slett(form: Form<StudentDeleteValues>, cfg: &State<AppConfig>, db: &State<DbPool>) -> Template {
    let username = trimmed(form.into_inner().username);
    let message = match delete_student(&db.0, &username).await {
        Ok(outcome) => PageMessage::from_delete(
            outcome,
            format!("Student «{username}» ble slettet."),
            format!("Fant ingen student med brukernavn «{username}»."),
        ),
        Err(err) => {
            log_registry_error("Student deletion", &err);
            PageMessage::from_error(&err)
        }
    };
    render_student_page(Some(message), NewStudent::default(), cfg, &db.0).await
}

#[get("/api/student")]
async fn get_api_student(db: &State<DbPool>) -> Result<Json<Vec<StudentRow>>, Custom<String>> {
    let students = list_students(&db.0).await.map_err(registry_to_custom_error)?;
    Ok(Json(students))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_student,
            post_student,
            post_student_slett,
            get_api_student,
        ])
}
