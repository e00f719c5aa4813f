use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvester_core::{HarvesterError, HarvesterResult};

/// The closed set of scraping task types known to the orchestrator.
///
/// Wire names use SCREAMING_SNAKE; anything outside this set is rejected
/// at the string boundary with `Unknown task type: <name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "LIVE_MATCHES")]
    LiveMatches,
    #[serde(rename = "UPCOMING_FIXTURES")]
    UpcomingFixtures,
    #[serde(rename = "HISTORICAL_DATA")]
    HistoricalData,
    #[serde(rename = "LEAGUE_DISCOVERY")]
    LeagueDiscovery,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::LiveMatches,
        TaskType::UpcomingFixtures,
        TaskType::HistoricalData,
        TaskType::LeagueDiscovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::LiveMatches => "LIVE_MATCHES",
            TaskType::UpcomingFixtures => "UPCOMING_FIXTURES",
            TaskType::HistoricalData => "HISTORICAL_DATA",
            TaskType::LeagueDiscovery => "LEAGUE_DISCOVERY",
        }
    }

    /// Fixed priority table; higher runs first.
    pub fn default_priority(&self) -> i32 {
        match self {
            TaskType::LiveMatches => 100,
            TaskType::UpcomingFixtures => 75,
            TaskType::HistoricalData => 50,
            TaskType::LeagueDiscovery => 25,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = HarvesterError;

    fn from_str(s: &str) -> HarvesterResult<Self> {
        match s {
            "LIVE_MATCHES" => Ok(TaskType::LiveMatches),
            "UPCOMING_FIXTURES" => Ok(TaskType::UpcomingFixtures),
            "HISTORICAL_DATA" => Ok(TaskType::HistoricalData),
            "LEAGUE_DISCOVERY" => Ok(TaskType::LeagueDiscovery),
            other => Err(HarvesterError::unknown_task_type(other)),
        }
    }
}

/// Per-type task payload, tagged by `dataType` on the wire.
///
/// Payloads are validated at the queue boundary by construction; handlers
/// receive the typed variant instead of digging through loose JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TaskPayload {
    Live {
        max_pages: u32,
        timeout_ms: u64,
        scheduled_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        url: Option<String>,
    },
    Upcoming {
        days_ahead: u32,
        max_pages: u32,
        timeout_ms: u64,
        scheduled_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        url: Option<String>,
    },
    Historical {
        days_back: u32,
        max_pages: u32,
        timeout_ms: u64,
        scheduled_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        url: Option<String>,
    },
    Discovery {
        max_depth: u32,
        timeout_ms: u64,
        scheduled_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        url: Option<String>,
    },
}

impl TaskPayload {
    /// Live-match sweep: shallow and fast.
    pub fn live() -> Self {
        TaskPayload::Live {
            max_pages: 5,
            timeout_ms: 30_000,
            scheduled_at: Utc::now(),
            url: None,
        }
    }

    /// Upcoming fixtures over the next week.
    pub fn upcoming() -> Self {
        TaskPayload::Upcoming {
            days_ahead: 7,
            max_pages: 10,
            timeout_ms: 60_000,
            scheduled_at: Utc::now(),
            url: None,
        }
    }

    /// Previous day's results backfill.
    pub fn historical() -> Self {
        TaskPayload::Historical {
            days_back: 1,
            max_pages: 20,
            timeout_ms: 120_000,
            scheduled_at: Utc::now(),
            url: None,
        }
    }

    /// League discovery crawl, bounded by depth.
    pub fn discovery() -> Self {
        TaskPayload::Discovery {
            max_depth: 3,
            timeout_ms: 180_000,
            scheduled_at: Utc::now(),
            url: None,
        }
    }

    /// The default payload for a task type.
    pub fn for_task_type(task_type: TaskType) -> Self {
        match task_type {
            TaskType::LiveMatches => Self::live(),
            TaskType::UpcomingFixtures => Self::upcoming(),
            TaskType::HistoricalData => Self::historical(),
            TaskType::LeagueDiscovery => Self::discovery(),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::Live { .. } => TaskType::LiveMatches,
            TaskPayload::Upcoming { .. } => TaskType::UpcomingFixtures,
            TaskPayload::Historical { .. } => TaskType::HistoricalData,
            TaskPayload::Discovery { .. } => TaskType::LeagueDiscovery,
        }
    }

    /// Execution timeout carried by the payload, consumed by the executor.
    pub fn timeout(&self) -> Duration {
        let ms = match self {
            TaskPayload::Live { timeout_ms, .. }
            | TaskPayload::Upcoming { timeout_ms, .. }
            | TaskPayload::Historical { timeout_ms, .. }
            | TaskPayload::Discovery { timeout_ms, .. } => *timeout_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn with_url<S: Into<String>>(mut self, target: S) -> Self {
        match &mut self {
            TaskPayload::Live { url, .. }
            | TaskPayload::Upcoming { url, .. }
            | TaskPayload::Historical { url, .. }
            | TaskPayload::Discovery { url, .. } => *url = Some(target.into()),
        }
        self
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            TaskPayload::Live { url, .. }
            | TaskPayload::Upcoming { url, .. }
            | TaskPayload::Historical { url, .. }
            | TaskPayload::Discovery { url, .. } => url.as_deref(),
        }
    }
}

/// Caller-supplied overrides for a single enqueue.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Defer visibility; the job stays `Delayed` until the delay elapses.
    pub delay: Option<Duration>,
    /// Overrides the fixed priority table.
    pub priority: Option<i32>,
    /// Overrides the handler attempt budget.
    pub attempts: Option<u32>,
}

impl TaskOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}
