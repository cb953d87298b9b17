use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::authz::Authorizer;
use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL +
/// compactor. Tenant = database name from the pgwire connection. The admin
/// identity is global: the same caller administers every tenant.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    authz: Arc<Authorizer>,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, admin: &str) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            authz: Arc::new(Authorizer::single_admin(admin)),
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify, self.authz.clone())?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(tenant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::model::RoomStatus;
    use std::fs;
    use ulid::Ulid;

    const ADMIN: &str = "admin";

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bookd_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = TenantManager::new(dir, 1000, ADMIN);

        let eng_a = tm.get_or_create("tenant_a").unwrap();
        let eng_b = tm.get_or_create("tenant_b").unwrap();

        // Same room id in both tenants is fine; bookings don't leak across
        let rid = Ulid::new();
        eng_a.add_room(ADMIN, rid, 1).await.unwrap();
        eng_b.add_room(ADMIN, rid, 1).await.unwrap();

        eng_a
            .book(ADMIN, Ulid::new(), rid, 1000, 2000)
            .await
            .unwrap();

        assert_eq!(eng_a.room_status(rid).await.unwrap(), RoomStatus::Booked);
        assert_eq!(eng_b.room_status(rid).await.unwrap(), RoomStatus::Free);
        assert!(eng_b.is_room_available(rid, 1000, 2000).await.unwrap());
    }

    #[tokio::test]
    async fn same_admin_across_tenants() {
        let dir = test_data_dir("shared_admin");
        let tm = TenantManager::new(dir, 1000, ADMIN);

        let eng = tm.get_or_create("t").unwrap();
        let result = eng.add_room("somebody_else", Ulid::new(), 1).await;
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = TenantManager::new(dir.clone(), 1000, ADMIN);

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        let _eng = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let dir = test_data_dir("same_eng");
        let tm = TenantManager::new(dir, 1000, ADMIN);

        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = TenantManager::new(dir.clone(), 1000, ADMIN);

        // Path traversal attempt
        let _eng = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        // Empty after sanitization
        let result = tm.get_or_create("../..");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let tm = TenantManager::new(dir, 1000, ADMIN);

        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let result = tm.get_or_create(&long_name);
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let dir = test_data_dir("count_limit");
        let tm = TenantManager::new(dir, 1000, ADMIN);

        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let result = tm.get_or_create("one_more");
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("too many tenants"));
    }
}
