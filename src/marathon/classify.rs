// Status classifier - derives the status and health labels of one app
//
// Both classifications are ordered priority chains following the Marathon
// application status/health reference: the first matching rule wins.

use std::fmt;

use super::app::{Application, QueueEntry};

/// One of the two independent classification axes evaluated per app
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    Health,
    Status,
}

impl Reference {
    /// Every reference, in publishing order.
    pub const ALL: [Reference; 2] = [Reference::Health, Reference::Status];

    pub fn as_str(self) -> &'static str {
        match self {
            Reference::Health => "health",
            Reference::Status => "status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "health" => Some(Reference::Health),
            "status" => Some(Reference::Status),
            _ => None,
        }
    }

    /// Valid state names for this reference.
    pub fn states(self) -> &'static [&'static str] {
        match self {
            Reference::Health => &AppHealth::NAMES,
            Reference::Status => &AppStatus::NAMES,
        }
    }

    pub fn is_state(self, name: &str) -> bool {
        self.states().contains(&name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling lifecycle of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Waiting,
    Delayed,
    Suspended,
    Deploying,
    Running,
}

impl AppStatus {
    pub const NAMES: [&'static str; 5] = ["waiting", "delayed", "suspended", "deploying", "running"];

    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::Waiting => "waiting",
            AppStatus::Delayed => "delayed",
            AppStatus::Suspended => "suspended",
            AppStatus::Deploying => "deploying",
            AppStatus::Running => "running",
        }
    }
}

/// Aggregated task health of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppHealth {
    Unscheduled,
    Overcapacity,
    Staged,
    Unknown,
    Unhealthy,
    Healthy,
}

impl AppHealth {
    pub const NAMES: [&'static str; 6] = [
        "unscheduled",
        "overcapacity",
        "staged",
        "unknown",
        "unhealthy",
        "healthy",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppHealth::Unscheduled => "unscheduled",
            AppHealth::Overcapacity => "overcapacity",
            AppHealth::Staged => "staged",
            AppHealth::Unknown => "unknown",
            AppHealth::Unhealthy => "unhealthy",
            AppHealth::Healthy => "healthy",
        }
    }
}

/// Classifies the scheduling status; `None` means unclassified.
pub fn classify_status(app: &Application, queue_entry: Option<&QueueEntry>) -> Option<AppStatus> {
    match queue_entry.and_then(QueueEntry::overdue) {
        Some(true) => return Some(AppStatus::Waiting),
        Some(false) => return Some(AppStatus::Delayed),
        None => {}
    }

    if app.instances() == 0 && app.tasks_running() == 0 {
        Some(AppStatus::Suspended)
    } else if app.deployment_count() > 0 {
        Some(AppStatus::Deploying)
    } else if app.instances() == app.tasks_running() {
        Some(AppStatus::Running)
    } else {
        None
    }
}

/// Classifies task health; `None` means unclassified.
pub fn classify_health(app: &Application) -> Option<AppHealth> {
    if app.task_count() == 0 && app.deployment_count() == 0 {
        Some(AppHealth::Unscheduled)
    } else if app.instances() < app.tasks_running() {
        Some(AppHealth::Overcapacity)
    } else if app.tasks_staged() > 0 {
        Some(AppHealth::Staged)
    } else if app.health_check_count() == 0 {
        Some(AppHealth::Unknown)
    } else if app.tasks_unhealthy() > 0 {
        Some(AppHealth::Unhealthy)
    } else if app.tasks_healthy() > 0 {
        Some(AppHealth::Healthy)
    } else {
        None
    }
}

/// State label for `reference`, empty when the app is unclassified.
pub fn classify(
    reference: Reference,
    app: &Application,
    queue_entry: Option<&QueueEntry>,
) -> &'static str {
    match reference {
        Reference::Health => classify_health(app).map(AppHealth::as_str),
        Reference::Status => classify_status(app, queue_entry).map(AppStatus::as_str),
    }
    .unwrap_or("")
}
