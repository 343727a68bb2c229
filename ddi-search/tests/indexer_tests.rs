//! Indexing against the in-memory store and search backend

use ddi_common::db::{MemoryStore, Repository, Store};
use ddi_common::events::{DdiEvent, EventBus};
use ddi_common::models::*;
use ddi_common::IdDeriver;
use ddi_search::documents::{NOT_CATEGORIZED, NOT_CATEGORIZED_DE};
use ddi_search::{DocumentType, IndexSynchronizer, MemoryIndex, SearchBackend, SearchIndexer};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Fixture {
    store: Arc<dyn Store>,
    index: Arc<MemoryIndex>,
    indexer: SearchIndexer,
    ids: IdDeriver,
    study: Study,
    dataset: Dataset,
}

async fn fixture() -> Fixture {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let index = Arc::new(MemoryIndex::new());
    let indexer = SearchIndexer::new(store.clone(), index.clone(), "ddionrails");
    let ids = IdDeriver::new(Uuid::new_v4());

    let mut study = Study::new(&ids, "soep-test");
    study.label = "SOEP Test".into();
    Repository::<Study>::new(store.clone()).upsert(&study).await.unwrap();

    let mut period = Period::new(&ids, study.id, "2010");
    period.label = "Year 2010".into();
    Repository::<Period>::new(store.clone()).upsert(&period).await.unwrap();

    let mut dataset = Dataset::new(&ids, study.id, "some-dataset");
    dataset.period_id = Some(period.id);
    Repository::<Dataset>::new(store.clone()).upsert(&dataset).await.unwrap();

    indexer.create(&DocumentType::ALL).await.unwrap();

    Fixture {
        store,
        index,
        indexer,
        ids,
        study,
        dataset,
    }
}

async fn add_variable(f: &Fixture, name: &str) -> Variable {
    let mut variable = Variable::new(&f.ids, f.dataset.id, name);
    variable.label = format!("Label of {}", name);
    Repository::<Variable>::new(f.store.clone()).upsert(&variable).await.unwrap();
    variable
}

#[tokio::test]
async fn test_variable_without_analysis_unit_is_not_categorized() {
    let f = fixture().await;
    let variable = add_variable(&f, "some-variable").await;

    let docs = f
        .indexer
        .build_documents(DocumentType::Variables, &[variable.id])
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);

    let (id, doc) = &docs[0];
    assert_eq!(*id, variable.id);
    assert_eq!(doc["analysis_unit"]["label"], NOT_CATEGORIZED);
    assert_eq!(doc["analysis_unit"]["label_de"], NOT_CATEGORIZED_DE);
    assert_eq!(doc["conceptual_dataset"]["label"], NOT_CATEGORIZED);
    // period inherited from the dataset
    assert_eq!(doc["period"]["label"], "Year 2010");
    assert_eq!(doc["study"]["label"], "SOEP Test");
    assert_eq!(doc["dataset_name"], "some-dataset");
}

#[tokio::test]
async fn test_none_sentinel_is_not_categorized() {
    let f = fixture().await;
    let none_unit = AnalysisUnit::new(&f.ids, f.study.id, NONE_NAME);
    Repository::<AnalysisUnit>::new(f.store.clone()).upsert(&none_unit).await.unwrap();

    let mut dataset = f.dataset.clone();
    dataset.analysis_unit_id = Some(none_unit.id);
    Repository::<Dataset>::new(f.store.clone()).upsert(&dataset).await.unwrap();
    let variable = add_variable(&f, "v").await;

    let docs = f
        .indexer
        .build_documents(DocumentType::Variables, &[variable.id])
        .await
        .unwrap();
    assert_eq!(docs[0].1["analysis_unit"]["label"], NOT_CATEGORIZED);
    assert_eq!(docs[0].1["analysis_unit"]["name"], "none");
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let f = fixture().await;
    let variable = add_variable(&f, "some-variable").await;
    let index = f.indexer.index_name(DocumentType::Variables);
    assert_eq!(index, "ddionrails.variables");

    f.indexer.index_entities(DocumentType::Variables, &[variable.id]).await.unwrap();
    let first = f.index.get_document(&index, variable.id).await.unwrap();
    f.indexer.index_entities(DocumentType::Variables, &[variable.id]).await.unwrap();
    let second = f.index.get_document(&index, variable.id).await.unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(f.index.count(&index).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rebuild_indexes_every_row() {
    let f = fixture().await;
    for i in 0..5 {
        add_variable(&f, &format!("v{}", i)).await;
    }
    let concept = Concept::new(&f.ids, "income");
    Repository::<Concept>::new(f.store.clone()).upsert(&concept).await.unwrap();
    let topic = Topic::new(&f.ids, f.study.id, "work");
    Repository::<Topic>::new(f.store.clone()).upsert(&topic).await.unwrap();
    Repository::<ConceptTopic>::new(f.store.clone())
        .upsert(&ConceptTopic::new(&f.ids, concept.id, topic.id))
        .await
        .unwrap();

    let total = f.indexer.rebuild(&DocumentType::ALL).await.unwrap();
    assert_eq!(total, 7);

    let concept_doc = f
        .index
        .get_document("ddionrails.concepts", concept.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(concept_doc["topics"][0], "work");
    assert_eq!(concept_doc["study_name"][0], "soep-test");

    // rebuild starts from empty indices
    assert_eq!(f.indexer.rebuild(&[DocumentType::Variables]).await.unwrap(), 5);
    assert_eq!(f.index.count("ddionrails.variables").await.unwrap(), 5);
}

#[tokio::test]
async fn test_question_document_lists_items() {
    let f = fixture().await;
    let instrument = Instrument::new(&f.ids, f.study.id, "some-instrument");
    Repository::<Instrument>::new(f.store.clone()).upsert(&instrument).await.unwrap();
    let question = Question::new(&f.ids, instrument.id, "q1");
    Repository::<Question>::new(f.store.clone()).upsert(&question).await.unwrap();

    let mut first = QuestionItem::new(&f.ids, question.id, "q1a");
    first.label = "First".into();
    first.sort_id = 1;
    let mut second = QuestionItem::new(&f.ids, question.id, "q1b");
    second.label = "Second".into();
    second.sort_id = 2;
    Repository::<QuestionItem>::new(f.store.clone())
        .upsert_many(&[second, first])
        .await
        .unwrap();

    let docs = f
        .indexer
        .build_documents(DocumentType::Questions, &[question.id])
        .await
        .unwrap();
    let doc = &docs[0].1;
    assert_eq!(doc["instrument"]["name"], "some-instrument");
    assert_eq!(doc["question_items"]["labels"], serde_json::json!(["First", "Second"]));
    assert_eq!(doc["period"]["label"], NOT_CATEGORIZED);
}

#[tokio::test]
async fn test_synchronizer_follows_events() {
    let f = fixture().await;
    let bus = EventBus::new(100);
    let handle = IndexSynchronizer::new(f.indexer.clone()).spawn(&bus);

    let variable = add_variable(&f, "synced").await;
    bus.emit(DdiEvent::changed("variables", variable.id)).unwrap();
    // not an indexed table
    bus.emit(DdiEvent::changed("datasets", f.dataset.id)).unwrap();

    let index = f.indexer.index_name(DocumentType::Variables);
    let mut found = None;
    for _ in 0..50 {
        found = f.index.get_document(&index, variable.id).await.unwrap();
        if found.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(found.unwrap()["name"], "synced");

    bus.emit(DdiEvent::deleted("variables", variable.id)).unwrap();
    let mut gone = false;
    for _ in 0..50 {
        if f.index.get_document(&index, variable.id).await.unwrap().is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gone);

    drop(bus);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_synchronizer_failure_is_not_fatal() {
    let f = fixture().await;
    f.indexer.delete(&DocumentType::ALL).await.unwrap();
    let sync = IndexSynchronizer::new(f.indexer.clone());

    let variable = add_variable(&f, "v").await;
    // index is gone: logged and reported as not applied
    assert!(!sync.handle(&DdiEvent::changed("variables", variable.id)).await);
    assert!(!sync.handle(&DdiEvent::changed("baskets", Uuid::new_v4())).await);
}
