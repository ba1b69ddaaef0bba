use std::collections::HashSet;
use std::env;
use std::sync::Arc;

/// Stand-in for the platform's external admin authorization check. The
/// review workflow consults it before any state transition; everything
/// beyond the boolean answer (sessions, roles) lives outside this
/// service.
#[derive(Debug, Clone)]
pub struct AdminDirectory {
    admin_ids: Arc<HashSet<String>>,
}

impl AdminDirectory {
    pub fn from_ids<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self {
            admin_ids: Arc::new(ids.into_iter().filter(|id| !id.is_empty()).collect()),
        }
    }

    pub fn is_authorized(&self, admin_id: &str) -> bool {
        self.admin_ids.contains(admin_id)
    }
}

// ADMIN_IDS is a comma-separated list of admin user ids
pub fn create_admin_directory() -> AdminDirectory {
    let raw = env::var("ADMIN_IDS").unwrap_or_default();
    AdminDirectory::from_ids(raw.split(',').map(|id| id.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_authorized() {
        let directory = AdminDirectory::from_ids(["admin_1".to_string(), "admin_2".to_string()]);
        assert!(directory.is_authorized("admin_1"));
        assert!(!directory.is_authorized("admin_3"));
        assert!(!directory.is_authorized(""));
    }

    #[test]
    fn test_empty_directory_authorizes_nobody() {
        let directory = AdminDirectory::from_ids(Vec::<String>::new());
        assert!(!directory.is_authorized("admin_1"));
    }
}
