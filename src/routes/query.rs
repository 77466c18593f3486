use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    #[serde(default)]
    pub(crate) email: Option<String>,
}
