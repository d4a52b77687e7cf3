#[macro_use] extern crate rocket;

use rocket::fairing::AdHoc;
use rocket::fs::FileServer;
use serde::Deserialize;
use rocket::State;
use rocket_dyn_templates::{context, Template};
use crate::db::DbPoolFairing;

mod db;
mod error;
mod klasse;
mod student;
mod util;

/// Settings read from `Rocket.toml` / `ROCKET_*` on top of Rocket's own.
#[derive(Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_app_title")]
    pub app_title: String,
}
fn default_app_title() -> String {
    "Studieadministrasjon".to_string()
}

#[get("/")]
fn index(cfg: &State<AppConfig>) -> Template {
    Template::render("index", context! {
        title: &cfg.app_title,
    })
}

#[launch]
fn rocket() -> _ {
    let rocket = rocket::build()
        .attach(Template::fairing())
        .attach(DbPoolFairing())
        .attach(AdHoc::config::<AppConfig>())
        .mount("/", FileServer::from("./static"))
        .mount("/", routes![
            index,
        ]);
    let rocket = klasse::extend(rocket);
    student::extend(rocket)
}
