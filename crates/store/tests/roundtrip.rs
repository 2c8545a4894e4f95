//! End to end: live graph -> capture -> store on disk -> read -> restore.

use keepsake_engine::{
    CaptureSession, ConverterRegistry, NodeHandle, NodeRef, RestoreHandler, RestoreOptions,
    RestoreSession, SaveError, Saveable, SnapshotHandler, node,
};
use keepsake_pipeline::{
    AesGcmEncryption, ChecksumAlgo, Pipeline, PipelineError, ZstdCompression,
};
use keepsake_store::{SaveStore, StoreError};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

struct Quest {
    title: String,
    progress: u32,
}

impl Saveable for Quest {
    const TYPE_TAG: &'static str = "quest";

    fn capture(&self, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        out.save("title", &self.title)?;
        out.save("progress", &self.progress)
    }

    fn create_shell() -> Self {
        Self {
            title: String::new(),
            progress: 0,
        }
    }

    fn restore(this: &NodeRef<Self>, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let mut me = this.borrow_mut();
        if let Some(title) = input.load("title")? {
            me.title = title;
        }
        if let Some(progress) = input.load("progress")? {
            me.progress = progress;
        }
        Ok(())
    }
}

struct Villager {
    name: String,
    active_quest: Option<NodeRef<Quest>>,
}

impl Saveable for Villager {
    const TYPE_TAG: &'static str = "villager";

    fn capture(&self, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        out.save("name", &self.name)?;
        out.save_ref("active_quest", self.active_quest.as_ref())
    }

    fn create_shell() -> Self {
        Self {
            name: String::new(),
            active_quest: None,
        }
    }

    fn restore(this: &NodeRef<Self>, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        if let Some(name) = input.load("name")? {
            this.borrow_mut().name = name;
        }
        let me = this.clone();
        input.defer_ref("active_quest", move |quest| {
            me.borrow_mut().active_quest = quest
        })?;
        Ok(())
    }
}

fn registry() -> Arc<ConverterRegistry> {
    let mut registry = ConverterRegistry::new();
    registry.register_handler::<Quest>();
    registry.register_handler::<Villager>();
    Arc::new(registry)
}

/// Two villagers sharing one quest instance.
fn capture_village(registry: &Arc<ConverterRegistry>) -> keepsake_engine::RootSaveData {
    let quest = node(Quest {
        title: "Fetch the lantern".into(),
        progress: 2,
    });
    let elder = node(Villager {
        name: "Maren".into(),
        active_quest: Some(quest.clone()),
    });
    let smith = node(Villager {
        name: "Tobin".into(),
        active_quest: Some(quest.clone()),
    });

    let mut session = CaptureSession::new(registry.clone());
    session
        .capture_root("village", "elder", &NodeHandle::new(&elder))
        .unwrap();
    session
        .capture_root("village", "smith", &NodeHandle::new(&smith))
        .unwrap();
    session.finish()
}

#[test]
fn graph_survives_a_trip_through_the_default_store() {
    let registry = registry();
    let data = capture_village(&registry);

    let tmp = tempfile::tempdir().unwrap();
    let store = SaveStore::open(tmp.path()).unwrap();
    let mut custom = BTreeMap::new();
    custom.insert("area".to_string(), "village".to_string());
    store.write("autosave", &data, custom.clone()).unwrap();

    let loaded = store.read("autosave").unwrap().unwrap();
    assert_eq!(loaded, data);
    let meta = store.read_meta("autosave").unwrap().unwrap();
    assert_eq!(meta.custom, custom);

    let mut restore = RestoreSession::new(registry);
    let report = restore.restore(&loaded, &RestoreOptions::hard()).unwrap();
    assert_eq!(report.created, 3);
    assert!(report.dangling.is_empty());

    let elder: NodeRef<Villager> = restore
        .resolve(&keepsake_engine::GuidPath::root("village", "elder"))
        .unwrap();
    let smith: NodeRef<Villager> = restore
        .resolve(&keepsake_engine::GuidPath::root("village", "smith"))
        .unwrap();
    assert_eq!(elder.borrow().name, "Maren");

    // The shared quest comes back as one instance, not two copies.
    let elder_quest = elder.borrow().active_quest.clone().unwrap();
    let smith_quest = smith.borrow().active_quest.clone().unwrap();
    assert!(Rc::ptr_eq(&elder_quest, &smith_quest));
    assert_eq!(elder_quest.borrow().title, "Fetch the lantern");
    assert_eq!(elder_quest.borrow().progress, 2);
}

#[test]
fn tampered_payload_is_rejected_not_loaded() {
    let registry = registry();
    let data = capture_village(&registry);

    let tmp = tempfile::tempdir().unwrap();
    let store = SaveStore::open(tmp.path()).unwrap();
    store.write("slot", &data, BTreeMap::new()).unwrap();

    let payload_path = tmp.path().join("slot.save");
    let mut bytes = std::fs::read(&payload_path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&payload_path, &bytes).unwrap();

    let err = store.read("slot").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Pipeline(PipelineError::IntegrityCheckFailed { .. })
    ));
}

#[test]
fn encrypted_store_roundtrips_and_rejects_the_wrong_key() {
    let registry = registry();
    let data = capture_village(&registry);
    let tmp = tempfile::tempdir().unwrap();

    let pipeline = Pipeline::new(
        Box::new(ZstdCompression::default()),
        Box::new(AesGcmEncryption::from_passphrase("correct horse")),
        ChecksumAlgo::Sha256,
    );
    let store = SaveStore::with_pipeline(tmp.path(), pipeline).unwrap();
    store.write("slot", &data, BTreeMap::new()).unwrap();
    assert_eq!(store.read("slot").unwrap().unwrap(), data);

    let wrong = Pipeline::new(
        Box::new(ZstdCompression::default()),
        Box::new(AesGcmEncryption::from_passphrase("battery staple")),
        ChecksumAlgo::Sha256,
    );
    let reader = SaveStore::with_pipeline(tmp.path(), wrong).unwrap();
    let err = reader.read("slot").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Pipeline(PipelineError::Encryption(_))
    ));
}

#[test]
fn overwriting_a_slot_keeps_the_latest_state() {
    let registry = registry();
    let tmp = tempfile::tempdir().unwrap();
    let store = SaveStore::open(tmp.path()).unwrap();

    let first = capture_village(&registry);
    store.write("slot", &first, BTreeMap::new()).unwrap();

    let quest = node(Quest {
        title: "Fetch the lantern".into(),
        progress: 9,
    });
    let elder = node(Villager {
        name: "Maren".into(),
        active_quest: Some(quest),
    });
    let mut session = CaptureSession::new(registry.clone());
    session
        .capture_root("village", "elder", &NodeHandle::new(&elder))
        .unwrap();
    let second = session.finish();
    store.write("slot", &second, BTreeMap::new()).unwrap();

    let loaded = store.read("slot").unwrap().unwrap();
    assert_eq!(loaded, second);
    assert_ne!(loaded, first);
}
