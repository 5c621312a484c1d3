use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::time::Duration;

use super::*;
use crate::app::AppFactory;
use crate::config::{Config, SemanticSearchConfig};
use crate::eid::Eid;
use crate::library::Library;
use crate::records::RecordUpdate;
use crate::semantic::{CancelToken, IndexStatus, SemanticSearchService, ServiceError};

fn service_with(
    categories: Vec<Category>,
    encoder: HashEncoder,
) -> (SemanticSearchService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with(categories));
    let service = SemanticSearchService::load(
        store.clone(),
        Arc::new(encoder),
        &SemanticSearchConfig::default(),
    )
    .unwrap();
    (service, store)
}

fn names(service: &SemanticSearchService) -> Vec<String> {
    service
        .category_sizes()
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

#[test]
fn test_add_record_creates_category_and_persists_once() {
    let (service, store) = service_with(vec![], HashEncoder::new());

    let id = service
        .add_record("Local AI", link("Ollama", "local model runner", "https://ollama.ai/"))
        .unwrap();
    service
        .add_record("Local AI", link("Jan", "", "https://jan.ai/"))
        .unwrap();

    assert_eq!(store.saves(), 2);
    assert_eq!(service.category_sizes(), [("Local AI".to_string(), 2)]);

    let record = service.find_record(&id).unwrap();
    assert_eq!(record.title, "Ollama");
    assert!(record.embedding.is_none());
}

#[test]
fn test_delete_record() {
    let ollama = link("Ollama", "", "https://ollama.ai/");
    let id = ollama.id.clone();
    let (service, store) = service_with(vec![category("AI", vec![ollama])], HashEncoder::new());

    let removed = service.delete_record(&id).unwrap();
    assert_eq!(removed.title, "Ollama");
    assert!(store.stored()[0].items.is_empty());

    let err = service.delete_record(&Eid::from("missing")).unwrap_err();
    assert!(matches!(err, ServiceError::RecordNotFound(_)));
    assert_eq!(store.saves(), 1);
}

#[test]
fn test_update_record_keeps_embedding() {
    let ollama = embedded(link("Ollama", "local model runner", "https://ollama.ai/"));
    let id = ollama.id.clone();
    let vector = ollama.embedding.clone();
    let store = Arc::new(MemoryStore::with(vec![
        category("AI", vec![ollama]),
        category("Tools", vec![]),
    ]));
    let encoder = Arc::new(HashEncoder::new());
    let service =
        SemanticSearchService::load(store.clone(), encoder.clone(), &SemanticSearchConfig::default())
            .unwrap();

    let updated = service
        .update_record(
            &id,
            &RecordUpdate {
                title: Some("Ollama CLI".to_string()),
                description: Some(String::new()),
                category: Some("Tools".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "Ollama CLI");
    assert!(updated.description.is_none());
    assert_eq!(updated.embedding, vector);
    assert_eq!(
        service.category_sizes(),
        [("AI".to_string(), 0), ("Tools".to_string(), 1)]
    );
    assert_eq!(store.stored()[1].items[0].title, "Ollama CLI");
    assert_eq!(store.saves(), 1);

    // the edited text is not re-embedded by the next pass
    let report = service.index(&CancelToken::default(), |_| {}).unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(encoder.calls(), 0);
    assert_eq!(service.find_record(&id).unwrap().embedding, vector);
}

#[test]
fn test_update_record_errors_leave_library_untouched() {
    let ollama = link("Ollama", "", "https://ollama.ai/");
    let id = ollama.id.clone();
    let (service, store) = service_with(vec![category("AI", vec![ollama])], HashEncoder::new());

    let err = service
        .update_record(
            &id,
            &RecordUpdate {
                title: Some("Renamed".to_string()),
                category: Some("Missing".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::CategoryNotFound(name) if name == "Missing"));
    assert_eq!(service.find_record(&id).unwrap().title, "Ollama");

    let err = service
        .update_record(&Eid::from("missing"), &RecordUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::RecordNotFound(_)));
    assert_eq!(store.saves(), 0);
}

#[test]
fn test_add_category_rejects_duplicates() {
    let (service, store) = service_with(vec![category("Dev", vec![])], HashEncoder::new());

    service.add_category("Notes").unwrap();
    let err = service.add_category("Dev").unwrap_err();

    assert!(matches!(err, ServiceError::CategoryExists(name) if name == "Dev"));
    assert_eq!(names(&service), ["Dev", "Notes"]);
    assert_eq!(store.saves(), 1);
}

#[test]
fn test_delete_category_moves_records_to_first_remaining() {
    let (service, store) = service_with(
        vec![
            category("Dev", vec![link("GitHub", "", "https://github.com/")]),
            category("AI", vec![link("Ollama", "", "https://ollama.ai/")]),
        ],
        HashEncoder::new(),
    );

    service.delete_category("AI").unwrap();
    assert_eq!(service.category_sizes(), [("Dev".to_string(), 2)]);

    // the last category takes its records with it
    service.delete_category("Dev").unwrap();
    assert!(service.category_sizes().is_empty());
    assert!(store.stored().is_empty());

    let err = service.delete_category("Dev").unwrap_err();
    assert!(matches!(err, ServiceError::CategoryNotFound(_)));
}

#[test]
fn test_import_merges_by_name() {
    let (service, _store) = service_with(
        vec![category("Dev", vec![link("GitHub", "", "https://github.com/")])],
        HashEncoder::new(),
    );

    let added = service
        .import(vec![
            category("Dev", vec![link("Dev.to", "", "https://dev.to/")]),
            category("AI", vec![link("Ollama", "", "https://ollama.ai/")]),
        ])
        .unwrap();

    assert_eq!(added, 2);
    assert_eq!(
        service.category_sizes(),
        [("Dev".to_string(), 2), ("AI".to_string(), 1)]
    );
}

#[test]
fn test_storage_failure_is_reported() {
    let (service, store) = service_with(vec![], HashEncoder::new());
    store.fail_saves(true);

    let err = service.add_category("Dev").unwrap_err();
    assert!(matches!(err, ServiceError::Storage(_)));
}

#[test]
fn test_status_tracks_indexing() {
    let (service, _store) = service_with(
        vec![category(
            "AI",
            vec![
                embedded(link("Jan", "", "https://jan.ai/")),
                link("Ollama", "", "https://ollama.ai/"),
            ],
        )],
        HashEncoder::new(),
    );

    assert_eq!(
        service.status(),
        IndexStatus {
            model_loaded: true,
            records: 2,
            embedded: 1
        }
    );

    service.index(&CancelToken::default(), |_| {}).unwrap();
    assert_eq!(service.status().embedded, 2);
}

#[test]
fn test_search_returns_owned_hits() {
    let (service, _store) = service_with(
        vec![
            category("AI", vec![link("Ollama", "local model runner", "https://ollama.ai/")]),
            category("Dev", vec![link("GitHub", "", "https://github.com/")]),
        ],
        HashEncoder::new(),
    );

    let text = service.search("olla", false);
    assert_eq!(text.len(), 1);
    assert_eq!(text[0].name, "AI");
    assert_eq!(text[0].hits[0].title, "Ollama");
    assert_eq!(text[0].hits[0].label, "");

    // before indexing every record falls back to literal matching
    let semantic = service.search("olla", true);
    assert_eq!(semantic[0].hits[0].label, "Text Match");

    service.index(&CancelToken::default(), |_| {}).unwrap();
    let semantic = service.search("local model runner", true);
    assert_eq!(semantic[0].hits[0].title, "Ollama");
    assert!(semantic[0].hits[0].label.ends_with("% Match"));
}

#[test]
fn test_search_embeds_query_outside_the_library_lock() {
    let shared: Arc<OnceLock<Arc<Library>>> = Arc::default();
    let writer_ran = Arc::new(AtomicBool::new(false));

    let encoder = {
        let shared = shared.clone();
        let writer_ran = writer_ran.clone();
        HashEncoder::new().with_hook(move |_| {
            let Some(library) = shared.get().cloned() else {
                return;
            };
            let (tx, rx) = mpsc::channel();
            std::thread::spawn(move || {
                library.update(|_| ());
                let _ = tx.send(());
            });
            if rx.recv_timeout(Duration::from_secs(1)).is_ok() {
                writer_ran.store(true, Ordering::SeqCst);
            }
        })
    };
    let (service, _store) = service_with(
        vec![category("AI", vec![embedded(link("Ollama", "local model runner", "https://ollama.ai/"))])],
        encoder,
    );
    let _ = shared.set(service.library().clone());

    let hits = service.search("local model runner", true);

    assert!(writer_ran.load(Ordering::SeqCst));
    assert_eq!(hits[0].hits[0].title, "Ollama");
}

#[test]
fn test_search_during_background_indexing() {
    let records = (0..6)
        .map(|i| link(&format!("Link {i}"), "", "https://example.com/"))
        .collect();
    let (service, store) = service_with(
        vec![category("Misc", records)],
        HashEncoder::new().with_delay(Duration::from_millis(10)),
    );

    let mut pass = service.start_indexing().unwrap();
    let mut seen = vec![];
    for progress in &mut pass {
        // readers see a partially indexed set, never a torn vector
        for hit in service.search("", true).iter().flat_map(|c| &c.hits) {
            assert_eq!(hit.label, "AI Active");
        }
        seen.push(service.status().embedded);
        assert!(progress.processed <= progress.total);
    }
    pass.wait().unwrap();

    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(service.status().embedded, 6);
    assert_eq!(store.saves(), 1);
}

#[test]
fn test_seeded_store_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::load_with(tmp.path()).unwrap();

    let service =
        AppFactory::create_service_with(&config, Arc::new(HashEncoder::new())).unwrap();
    assert_eq!(service.category_sizes().len(), 5);
    assert!(tmp.path().join("links.json").exists());

    let report = service.index(&CancelToken::default(), |_| {}).unwrap();
    assert_eq!(report.embedded, report.total);
    assert!(report.total > 30);

    // reload from disk: vectors survived and nothing is re-seeded
    let encoder = Arc::new(HashEncoder::new());
    let reloaded = AppFactory::create_service_with(&config, encoder.clone()).unwrap();
    let status = reloaded.status();
    assert_eq!(status.records, report.total);
    assert_eq!(status.embedded, status.records);

    let second = reloaded.index(&CancelToken::default(), |_| {}).unwrap();
    assert_eq!(second.total, 0);
    assert_eq!(encoder.calls(), 0);

    let hits = reloaded.search("Title: Ollama. Description: .", true);
    let local = hits.iter().find(|c| c.name == "Local AI").unwrap();
    assert_eq!(local.hits[0].title, "Ollama");
    assert_eq!(local.hits[0].label, "100% Match");
}

#[test]
fn test_seeding_can_be_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("config.yaml"), "seed_default_data: false\n").unwrap();
    let config = Config::load_with(tmp.path()).unwrap();

    let service =
        AppFactory::create_service_with(&config, Arc::new(HashEncoder::unavailable())).unwrap();

    assert!(service.category_sizes().is_empty());
    assert!(!service.is_model_loaded());
}
