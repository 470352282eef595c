//! Typed status messages pushed by crawler workers.

use serde::Serialize;

/// Wire discriminant of a status message (`type` field, 0..=7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    Handshake,
    Preflight,
    Progress,
    ErrorFatal,
    ErrorNonfatal,
    FinishSuccess,
    PageDone,
    PagePostponed,
}

impl MessageType {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => MessageType::Handshake,
            1 => MessageType::Preflight,
            2 => MessageType::Progress,
            3 => MessageType::ErrorFatal,
            4 => MessageType::ErrorNonfatal,
            5 => MessageType::FinishSuccess,
            6 => MessageType::PageDone,
            7 => MessageType::PagePostponed,
            _ => return None,
        })
    }
}

/// Phase a worker reports itself in (`status` field, 0..=8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerStatus {
    BuildingSitemap,
    PagesMain,
    ForumsMain,
    PagesPending,
    FilesPending,
    Compressing,
    FatalError,
    Other,
    Done,
}

impl WorkerStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => WorkerStatus::BuildingSitemap,
            1 => WorkerStatus::PagesMain,
            2 => WorkerStatus::ForumsMain,
            3 => WorkerStatus::PagesPending,
            4 => WorkerStatus::FilesPending,
            5 => WorkerStatus::Compressing,
            6 => WorkerStatus::FatalError,
            7 => WorkerStatus::Other,
            8 => WorkerStatus::Done,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            WorkerStatus::BuildingSitemap => 0,
            WorkerStatus::PagesMain => 1,
            WorkerStatus::ForumsMain => 2,
            WorkerStatus::PagesPending => 3,
            WorkerStatus::FilesPending => 4,
            WorkerStatus::Compressing => 5,
            WorkerStatus::FatalError => 6,
            WorkerStatus::Other => 7,
            WorkerStatus::Done => 8,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            WorkerStatus::BuildingSitemap => "Building the site map.",
            WorkerStatus::PagesMain => "Backing up pages.",
            WorkerStatus::ForumsMain => "Backing up forums.",
            WorkerStatus::PagesPending => "Processing missing pages.",
            WorkerStatus::FilesPending => "Processing missing files.",
            WorkerStatus::Compressing => "Compressing data.",
            WorkerStatus::FatalError => "Fatal client error. Cannot continue.",
            WorkerStatus::Other => "Unknown status.",
            WorkerStatus::Done => "Done, crawler client is shutting down.",
        }
    }
}

/// Failure category reported by a worker (`errorKind` field, 0..=14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ClientOffline,
    MalformedSitemap,
    VoteFetch,
    FileFetch,
    LockStatusFetch,
    ForumListFetch,
    ForumPostFetch,
    FileMetaFetch,
    FileUnlink,
    ForumCountMismatch,
    SiteInternal,
    Unexpected,
    MetaMissing,
    GivingUp,
    TokenInvalidated,
}

impl ErrorKind {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ErrorKind::ClientOffline,
            1 => ErrorKind::MalformedSitemap,
            2 => ErrorKind::VoteFetch,
            3 => ErrorKind::FileFetch,
            4 => ErrorKind::LockStatusFetch,
            5 => ErrorKind::ForumListFetch,
            6 => ErrorKind::ForumPostFetch,
            7 => ErrorKind::FileMetaFetch,
            8 => ErrorKind::FileUnlink,
            9 => ErrorKind::ForumCountMismatch,
            10 => ErrorKind::SiteInternal,
            11 => ErrorKind::Unexpected,
            12 => ErrorKind::MetaMissing,
            13 => ErrorKind::GivingUp,
            14 => ErrorKind::TokenInvalidated,
            _ => return None,
        })
    }

    /// Kinds that concern a specific page or file and must carry its `name`.
    pub fn requires_name(&self) -> bool {
        matches!(
            self,
            ErrorKind::VoteFetch
                | ErrorKind::FileFetch
                | ErrorKind::LockStatusFetch
                | ErrorKind::FileUnlink
                | ErrorKind::GivingUp
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ErrorKind::ClientOffline => "Cannot continue, the crawler client is offline.",
            ErrorKind::MalformedSitemap => "The site map is malformed.",
            ErrorKind::VoteFetch => "Failed to fetch rating data.",
            ErrorKind::FileFetch => "Failed to fetch a file.",
            ErrorKind::LockStatusFetch => "Failed to check the page lock status.",
            ErrorKind::ForumListFetch => "Failed to fetch the forum list.",
            ErrorKind::ForumPostFetch => "Failed to fetch a forum post.",
            ErrorKind::FileMetaFetch => "Failed to fetch file metadata.",
            ErrorKind::FileUnlink => "A file could not be deleted.",
            ErrorKind::ForumCountMismatch => "Forum post count mismatch.",
            ErrorKind::SiteInternal => "Internal error on the monitored site.",
            ErrorKind::Unexpected => "Unexpected crawler failure.",
            ErrorKind::MetaMissing => "Metadata is missing where it is required.",
            ErrorKind::GivingUp => "Fetching a revision failed repeatedly, giving up.",
            ErrorKind::TokenInvalidated => "The site invalidated the session token, waiting 30s.",
        }
    }
}

/// Error payload shared by `ErrorFatal` and `ErrorNonfatal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerError {
    pub kind: ErrorKind,
    pub name: Option<String>,
}

impl WorkerError {
    /// Human-readable text for logs and the message log.
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", self.kind.describe(), name),
            None => self.kind.describe().to_string(),
        }
    }
}

/// Payload of a `Progress` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressUpdate {
    /// Main page pass with item counters.
    PagesMain { done: u64, postponed: u64 },
    /// Any other reportable phase.
    Phase(WorkerStatus),
}

impl ProgressUpdate {
    pub fn status(&self) -> WorkerStatus {
        match self {
            ProgressUpdate::PagesMain { .. } => WorkerStatus::PagesMain,
            ProgressUpdate::Phase(status) => *status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum MessageKind {
    Handshake,
    Preflight { total: u64 },
    Progress(ProgressUpdate),
    ErrorFatal(WorkerError),
    ErrorNonfatal(WorkerError),
    FinishSuccess,
    PageDone,
    PagePostponed,
}

/// A decoded, validated status message addressed to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub tag: String,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl Message {
    pub fn new(tag: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            tag: tag.into(),
            kind,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::Handshake => MessageType::Handshake,
            MessageKind::Preflight { .. } => MessageType::Preflight,
            MessageKind::Progress(_) => MessageType::Progress,
            MessageKind::ErrorFatal(_) => MessageType::ErrorFatal,
            MessageKind::ErrorNonfatal(_) => MessageType::ErrorNonfatal,
            MessageKind::FinishSuccess => MessageType::FinishSuccess,
            MessageKind::PageDone => MessageType::PageDone,
            MessageKind::PagePostponed => MessageType::PagePostponed,
        }
    }
}
