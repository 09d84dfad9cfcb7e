//! Transient user-facing failure notices.

use std::fmt;

/// What went wrong, from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SavedLocally,
    SyncFailed,
    ToggleFailed,
    EditFailed,
    DeleteFailed,
    ClearFailed,
}

impl NoticeKind {
    pub fn message(self) -> &'static str {
        match self {
            NoticeKind::SavedLocally => "Could not save to server; saved locally only.",
            NoticeKind::SyncFailed => "Cannot reach server; using local data.",
            NoticeKind::ToggleFailed => "Could not update completion on server.",
            NoticeKind::EditFailed => "Could not update task on server.",
            NoticeKind::DeleteFailed => "Could not delete task on server.",
            NoticeKind::ClearFailed => "Could not delete completed tasks on server.",
        }
    }
}

/// The latest notice. A newer one replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl From<NoticeKind> for Notice {
    fn from(kind: NoticeKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_from_kind() {
        let notice = Notice::from(NoticeKind::DeleteFailed);
        assert_eq!(notice.kind, NoticeKind::DeleteFailed);
        assert_eq!(notice.to_string(), "Could not delete task on server.");
    }
}
