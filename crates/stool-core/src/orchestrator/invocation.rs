use chrono::Utc;

/// Context of one command run, passed explicitly to everything it drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Unique per run: UTC timestamp plus pid.
    pub id: String,
    /// Command line as typed by the operator.
    pub command: String,
    pub user: String,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_user(command, current_user())
    }

    pub fn with_user(command: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: format!(
                "{}-{}",
                Utc::now().format("%y%m%d%H%M%S%3f"),
                std::process::id()
            ),
            command: command.into(),
            user: user.into(),
        }
    }
}

/// Login name from the environment.
pub fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}
