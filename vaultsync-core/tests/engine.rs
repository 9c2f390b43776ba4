use anyhow::Result;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use vaultsync_core::{
    CryptoService, ManagedStore, MemoryKv, MemoryTransit, ReconciliationEngine, SecretLifecycle,
};
use vaultsync_spec::{Cipher, CiphertextMap, Error, KvApi, MANAGED_BY_KEY, SecretRecord};

const MOUNT: &str = "secret";
const IDENTITY: &str = "platform-team";

struct Harness {
    kv: MemoryKv,
    transit: MemoryTransit,
    engine: ReconciliationEngine<CryptoService<MemoryTransit>, MemoryKv>,
}

impl Harness {
    fn new() -> Self {
        let kv = MemoryKv::new();
        let transit = MemoryTransit::new();
        let engine = ReconciliationEngine::new(
            CryptoService::new(transit.clone(), "transit", "apps"),
            ManagedStore::new(kv.clone(), MOUNT, IDENTITY),
        );
        Self {
            kv,
            transit,
            engine,
        }
    }

    fn seal(&self, plaintext: &str) -> String {
        let ciphertext = self.engine.cipher().encrypt(plaintext).unwrap();
        self.transit.reset_counts();
        ciphertext
    }

    fn declared(&self, pairs: &[(&str, &str)]) -> CiphertextMap {
        pairs
            .iter()
            .map(|(key, plaintext)| (key.to_string(), self.seal(plaintext)))
            .collect()
    }

    fn live(&self, path: &str) -> Map<String, Value> {
        self.kv.read_data(MOUNT, path).unwrap().unwrap_or_default()
    }

    fn set_live(&self, path: &str, value: Value) {
        self.kv.write_data(MOUNT, path, &obj(value)).unwrap();
    }

    fn owner(&self, path: &str) -> Option<String> {
        self.kv
            .read_metadata(MOUNT, path)
            .unwrap()
            .and_then(|meta| meta.managed_by().map(str::to_string))
    }
}

fn obj(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn create_decrypts_and_tags_fresh_path() -> Result<()> {
    let h = Harness::new();
    let declared = h.declared(&[("password", "hunter2"), ("user", "admin")]);

    let stored = h.engine.create("apps/db", &declared)?;

    assert_eq!(stored, declared);
    assert_eq!(h.live("apps/db"), obj(json!({"password": "hunter2", "user": "admin"})));
    assert_eq!(h.owner("apps/db").as_deref(), Some(IDENTITY));
    assert_eq!(h.transit.decrypt_calls(), 2);
    assert_eq!(h.transit.encrypt_calls(), 0);
    Ok(())
}

#[test]
fn create_aborts_before_writing_on_decrypt_failure() {
    let h = Harness::new();
    let mut declared = h.declared(&[("a", "one"), ("c", "three")]);
    declared.insert("b".into(), "garbage".into());

    let err = h.engine.create("apps/db", &declared).unwrap_err();

    assert!(matches!(&err, Error::Secret { key, .. } if key == "b"));
    assert!(err.is_retryable());
    assert!(h.kv.calls().is_empty(), "no kv call expected: {:?}", h.kv.calls());
}

#[test]
fn create_refuses_foreign_and_untagged_paths() {
    let h = Harness::new();
    h.kv.seed(
        MOUNT,
        "apps/theirs",
        obj(json!({"a": "x"})),
        [(MANAGED_BY_KEY.to_string(), "billing".to_string())].into(),
    );
    h.kv.seed(
        MOUNT,
        "apps/legacy",
        obj(json!({"a": "x"})),
        BTreeMap::new(),
    );
    let declared = h.declared(&[("a", "y")]);

    assert_eq!(
        h.engine.create("apps/theirs", &declared).unwrap_err(),
        Error::NotManaged {
            key: "apps/theirs".into(),
            owner: Some("billing".into())
        }
    );
    assert_eq!(
        h.engine.update("apps/legacy", &declared).unwrap_err(),
        Error::NotManaged {
            key: "apps/legacy".into(),
            owner: None
        }
    );
    assert_eq!(h.live("apps/theirs"), obj(json!({"a": "x"})));
    assert_eq!(h.live("apps/legacy"), obj(json!({"a": "x"})));
}

#[test]
fn update_replaces_the_whole_map() -> Result<()> {
    let h = Harness::new();
    h.engine.create("apps/db", &h.declared(&[("a", "1"), ("b", "2")]))?;

    let next = h.declared(&[("b", "20"), ("c", "30")]);
    let stored = h.engine.update("apps/db", &next)?;

    assert_eq!(stored, next);
    assert_eq!(h.live("apps/db"), obj(json!({"b": "20", "c": "30"})));
    Ok(())
}

#[test]
fn read_without_remote_change_is_idempotent() -> Result<()> {
    let h = Harness::new();
    let declared = h.declared(&[("a", "1"), ("b", "2")]);
    h.engine.create("apps/db", &declared)?;
    h.transit.reset_counts();

    let first = h.engine.read("apps/db", &declared)?;
    let second = h.engine.read("apps/db", &first)?;

    assert_eq!(first, declared);
    assert_eq!(second, declared);
    assert_eq!(h.transit.encrypt_calls(), 0);
    Ok(())
}

#[test]
fn read_reencrypts_only_drifted_values() -> Result<()> {
    let h = Harness::new();
    let declared = h.declared(&[("a", "old"), ("b", "same")]);
    h.engine.create("apps/db", &declared)?;
    h.set_live("apps/db", json!({"a": "new", "b": "same"}));
    h.transit.reset_counts();

    let report = h.engine.reconcile("apps/db", &declared)?;

    assert_eq!(report.changed, vec!["a".to_string()]);
    assert!(report.removed.is_empty());
    assert_eq!(h.transit.encrypt_calls(), 1);
    assert_eq!(report.secrets["b"], declared["b"]);
    assert_ne!(report.secrets["a"], declared["a"]);
    assert_eq!(h.engine.cipher().decrypt(&report.secrets["a"])?, "new");
    Ok(())
}

#[test]
fn read_drops_keys_removed_remotely_and_adopts_new_ones() -> Result<()> {
    let h = Harness::new();
    let declared = h.declared(&[("a", "1"), ("c", "3")]);
    h.engine.create("apps/db", &declared)?;
    h.set_live("apps/db", json!({"a": "1", "d": "4"}));

    let report = h.engine.reconcile("apps/db", &declared)?;

    assert_eq!(report.secrets.keys().collect::<Vec<_>>(), vec!["a", "d"]);
    assert_eq!(report.removed, vec!["c".to_string()]);
    assert_eq!(report.changed, vec!["d".to_string()]);
    assert!(report.has_drift());
    assert_eq!(h.engine.cipher().decrypt(&report.secrets["d"])?, "4");
    Ok(())
}

#[test]
fn read_rejects_non_string_live_values() -> Result<()> {
    let h = Harness::new();
    let declared = h.declared(&[("port", "5432")]);
    h.engine.create("apps/db", &declared)?;
    h.set_live("apps/db", json!({"port": 5432}));

    let err = h.engine.read("apps/db", &declared).unwrap_err();

    assert_eq!(
        err,
        Error::UnexpectedValueType {
            key: "port".into(),
            found: "a number"
        }
    );
    Ok(())
}

#[test]
fn read_aborts_on_undecryptable_cache_before_touching_kv() -> Result<()> {
    let h = Harness::new();
    let declared = h.declared(&[("a", "1"), ("c", "3")]);
    h.engine.create("apps/db", &declared)?;
    h.kv.clear_calls();
    h.transit.reset_counts();

    let mut cached = declared.clone();
    cached.insert("b".into(), "garbage".into());
    let err = h.engine.read("apps/db", &cached).unwrap_err();

    assert!(matches!(&err, Error::Secret { key, .. } if key == "b"), "{err}");
    assert!(h.kv.calls().is_empty(), "no kv call expected: {:?}", h.kv.calls());
    assert_eq!(h.transit.encrypt_calls(), 0);
    Ok(())
}

#[test]
fn destroy_refuses_foreign_owner() {
    let h = Harness::new();
    h.kv.seed(
        MOUNT,
        "apps/theirs",
        obj(json!({"a": "x"})),
        [(MANAGED_BY_KEY.to_string(), "billing".to_string())].into(),
    );

    assert_eq!(
        h.engine.destroy("apps/theirs").unwrap_err(),
        Error::NotManaged {
            key: "apps/theirs".into(),
            owner: Some("billing".into())
        }
    );
    assert_eq!(h.owner("apps/theirs").as_deref(), Some("billing"));
    assert_eq!(h.live("apps/theirs"), obj(json!({"a": "x"})));
}

#[test]
fn check_write_validates_without_writing() -> Result<()> {
    let h = Harness::new();
    h.kv.seed(
        MOUNT,
        "apps/theirs",
        obj(json!({"a": "x"})),
        [(MANAGED_BY_KEY.to_string(), "billing".to_string())].into(),
    );
    let declared = h.declared(&[("a", "1")]);
    let mut broken = declared.clone();
    broken.insert("b".into(), "garbage".into());

    h.engine.check_write("apps/fresh", &declared)?;
    assert!(h.engine.check_write("apps/fresh", &broken).is_err());
    assert!(h.engine.check_write("apps/theirs", &declared).unwrap_err().is_not_managed());
    assert!(h.kv.calls().iter().all(|call| call.starts_with("read_metadata")));
    assert!(h.kv.read_metadata(MOUNT, "apps/fresh")?.is_none());
    Ok(())
}

#[test]
fn read_of_missing_path_is_not_found() {
    let h = Harness::new();
    let err = h.engine.read("apps/ghost", &CiphertextMap::new()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn import_claims_without_touching_data() -> Result<()> {
    let h = Harness::new();
    h.kv.seed(
        MOUNT,
        "apps/legacy",
        obj(json!({"token": "abc"})),
        [("team".to_string(), "web".to_string())].into(),
    );

    let record = h.engine.import("apps/legacy")?;

    assert_eq!(record, SecretRecord::claimed("apps/legacy"));
    assert_eq!(h.owner("apps/legacy").as_deref(), Some(IDENTITY));
    assert_eq!(h.live("apps/legacy"), obj(json!({"token": "abc"})));
    let meta = h.kv.read_metadata(MOUNT, "apps/legacy")?.unwrap();
    assert_eq!(meta.current_version, 1);
    assert_eq!(meta.custom_metadata["team"], "web");

    let adopted = h.engine.reconcile("apps/legacy", &record.encrypted_secrets)?;
    assert_eq!(adopted.changed, vec!["token".to_string()]);
    assert_eq!(h.engine.cipher().decrypt(&adopted.secrets["token"])?, "abc");
    Ok(())
}

#[test]
fn destroy_requires_metadata() {
    let h = Harness::new();
    let err = h.engine.destroy("apps/ghost").unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_not_managed());
}

#[test]
fn secret_lifecycle_end_to_end() -> Result<()> {
    let h = Harness::new();
    let hello = h.seal("hello");
    let declared: CiphertextMap = [("secret".to_string(), hello.clone())].into();

    let stored = h.engine.create("apps/web", &declared)?;
    assert_eq!(h.live("apps/web"), obj(json!({"secret": "hello"})));
    assert_eq!(h.owner("apps/web").as_deref(), Some(IDENTITY));

    let unchanged = h.engine.read("apps/web", &stored)?;
    assert_eq!(unchanged["secret"], hello);

    h.set_live("apps/web", json!({"secret": "world"}));
    let drifted = h.engine.read("apps/web", &unchanged)?;
    assert_ne!(drifted["secret"], hello);
    assert_eq!(h.engine.cipher().decrypt(&drifted["secret"])?, "world");

    h.engine.destroy("apps/web")?;
    assert!(h.engine.store().get("apps/web").unwrap_err().is_not_found());
    assert!(h.kv.read_metadata(MOUNT, "apps/web")?.is_none());
    Ok(())
}

#[test]
fn lifecycle_works_through_trait_objects() -> Result<()> {
    let engine: Box<dyn SecretLifecycle> =
        Box::new(vaultsync_core::MemoryEngine::in_memory(IDENTITY));
    let record = engine.import("apps/empty")?;
    assert!(record.encrypted_secrets.is_empty());
    engine.destroy("apps/empty")?;
    Ok(())
}
