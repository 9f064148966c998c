use crate::api::{Mode, User};
use crate::app::App;
use crate::commands::Out;
use crate::Result;
use serde::Serialize;

/// What `status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mode: Mode,
    pub user: Option<User>,
    pub records: usize,
}

/// Reports the mode, the signed-in user and how many records are loaded.
pub async fn status(app: &App) -> Result<Out<StatusReport>> {
    let report = StatusReport {
        mode: app.mode(),
        user: app.user().cloned(),
        records: app.records().len(),
    };
    let who = match &report.user {
        Some(user) => format!("signed in as {}", user.email),
        None => "not signed in".to_string(),
    };
    let message = format!(
        "Running {} and {who}, {} records loaded",
        report.mode, report.records
    );
    Ok(Out::new(message, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status() {
        let mut app = App::offline();
        let out = status(&app).await.unwrap();
        assert_eq!(out.message(), "Running offline and not signed in, 0 records loaded");

        app.resume().await.unwrap();
        let out = status(&app).await.unwrap();
        assert_eq!(
            out.message(),
            "Running offline and signed in as admin@example.com, 5 records loaded"
        );
        assert_eq!(out.structure().unwrap().records, 5);
    }
}
