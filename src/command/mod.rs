mod check_config;
mod run;
mod schema;

pub use check_config::check_config;
pub use run::run;
pub use schema::schema;
