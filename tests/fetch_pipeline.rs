mod common;

use common::{rows_for, settings, FakeInstance, FakeSync, Reply};
use std::{
    num::NonZeroUsize,
    sync::{atomic::Ordering, Arc},
};

use covid_counties::{
    error::FetchError,
    handler::{HandlerPipe, InstanceKey},
    host::SyncStatus,
    registration::PipeParameters,
    CaseFrame, CovidFetcher, FetchOptions, Fips, RetrievalPolicy, StateCode, StateTable,
};

fn parameters(codes: &[&str]) -> PipeParameters {
    PipeParameters::new(codes.iter().map(|&c| Fips::from(c)).collect())
}

fn fetcher(
    instance: &Arc<FakeInstance>,
    sync: &Arc<FakeSync>,
    policy: RetrievalPolicy,
) -> CovidFetcher<Arc<FakeInstance>, Arc<FakeSync>> {
    CovidFetcher::new(
        Arc::new(StateTable::packaged().unwrap()),
        instance.clone(),
        sync.clone(),
        settings(&["CA", "CO", "GA", "TX", "US"], policy),
    )
}

fn state_pipe(state: &str, fips: &[&str]) -> HandlerPipe {
    HandlerPipe::for_state(
        StateCode::from(state),
        fips.iter().map(|&f| Fips::from(f)).collect(),
        "cases",
        InstanceKey::sql("_covid"),
    )
}

fn fips_column(frame: &CaseFrame) -> Vec<&str> {
    frame.rows().iter().map(|r| r.fips.as_str()).collect()
}

#[tokio::test]
async fn merges_states_in_routing_order() {
    let instance = FakeInstance::new();
    instance.reply("CA", Reply::Rows(rows_for(&["06037"], 10)));
    instance.reply("CO", Reply::Rows(rows_for(&["08031"], 20)));
    instance.reply("US", Reply::Rows(rows_for(&["99999"], 30)));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let frame = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06037", "08031", "99999"]), &FetchOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fips_column(&frame), vec!["06037", "08031", "99999"]);
    assert_eq!(frame.rows().iter().map(|r| r.cases).collect::<Vec<_>>(), vec![10, 20, 30]);
    let value = serde_json::to_value(&frame.rows()[0]).unwrap();
    assert_eq!(value.as_object().unwrap().len(), CaseFrame::COLUMNS.len());
}

#[tokio::test]
async fn provisions_only_unknown_pipes_and_syncs_once() {
    let instance = FakeInstance::new();
    instance.preregister(&state_pipe("CA", &["06037"]));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06037", "08031"]), &FetchOptions { debug: true, workers: NonZeroUsize::new(3) })
        .await
        .unwrap();

    assert_eq!(instance.register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(instance.edit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(instance.registered.lock().unwrap().len(), 2);

    let batches = sync.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let (keys, options) = &batches[0];
    assert_eq!(
        keys.iter().map(|k| k.connector.as_str()).collect::<Vec<_>>(),
        vec!["plugin:CA-covid", "plugin:CO-covid"]
    );
    assert_eq!(options.workers, NonZeroUsize::new(3));
    assert!(options.debug);
    assert_eq!(options.instance.to_string(), "sql:_covid");
}

#[tokio::test]
async fn all_fallback_counties_use_one_handler() {
    let instance = FakeInstance::new();
    instance.reply("US", Reply::Rows(rows_for(&["99999", "99998"], 1)));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let frame = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["99999", "99998"]), &FetchOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(instance.register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sync.batches.lock().unwrap()[0].0.len(), 1);
    assert_eq!(fips_column(&frame), vec!["99999", "99998"]);
}

#[tokio::test]
async fn no_data_anywhere_is_none_not_an_error() {
    let instance = FakeInstance::new();
    instance.reply("CA", Reply::Empty);
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let result = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06037", "08031"]), &FetchOptions::default())
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(instance.get_data_calls(), 2);
}

#[tokio::test]
async fn failed_sync_aborts_before_retrieval() {
    let instance = FakeInstance::new();
    instance.reply("CA", Reply::Rows(rows_for(&["06037"], 5)));
    let sync = FakeSync::new(SyncStatus::Failed { code: Some(1) });

    let error = fetcher(&instance, &sync, RetrievalPolicy::WarnAndSkip)
        .fetch(&parameters(&["06037"]), &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::SyncFailed { code: Some(1) }));
    assert_eq!(instance.get_data_calls(), 0);
}

#[tokio::test]
async fn unchecked_sync_proceeds_to_retrieval() {
    let instance = FakeInstance::new();
    instance.reply("TX", Reply::Rows(rows_for(&["48201"], 9)));
    let sync = FakeSync::new(SyncStatus::Unchecked);

    let frame = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["48201"]), &FetchOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.len(), 1);
}

#[tokio::test]
async fn retrieval_failure_aborts_by_default() {
    let instance = FakeInstance::new();
    instance.reply("CA", Reply::Fail);
    instance.reply("CO", Reply::Rows(rows_for(&["08031"], 2)));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let error = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06037", "08031"]), &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::Retrieval { keys, .. } if keys.location == "CA"));
}

#[tokio::test]
async fn retrieval_failure_can_be_skipped() {
    let instance = FakeInstance::new();
    instance.reply("CA", Reply::Fail);
    instance.reply("CO", Reply::Rows(rows_for(&["08031"], 2)));
    instance.reply("GA", Reply::Rows(vec![common::row(serde_json::json!({ "date": "2021-03-01" }))]));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let frame = fetcher(&instance, &sync, RetrievalPolicy::WarnAndSkip)
        .fetch(&parameters(&["06037", "08031", "13121"]), &FetchOptions { debug: false, workers: NonZeroUsize::new(2) })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fips_column(&frame), vec!["08031"]);
}

#[tokio::test]
async fn rows_that_do_not_fit_the_columns_abort() {
    let instance = FakeInstance::new();
    instance.reply("CA", Reply::Rows(vec![common::row(serde_json::json!({ "date": "soon", "fips": "06037", "cases": 1 }))]));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let error = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06037"]), &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, FetchError::Coercion { .. }));
}

#[tokio::test]
async fn malformed_county_stops_before_provisioning() {
    let instance = FakeInstance::new();
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let error = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06037", "?"]), &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::Routing(_)));
    assert_eq!(instance.register_calls.load(Ordering::SeqCst), 0);
    assert!(sync.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn parallel_reads_keep_handler_order() {
    let instance = FakeInstance::new();
    for (state, fips) in [("CA", "06037"), ("CO", "08031"), ("GA", "13121"), ("TX", "48201"), ("US", "36061")] {
        instance.reply(state, Reply::Rows(rows_for(&[fips], 1)));
    }
    let sync = FakeSync::new(SyncStatus::Succeeded);

    let frame = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(
            &parameters(&["48201", "36061", "06037", "13121", "08031"]),
            &FetchOptions { debug: false, workers: NonZeroUsize::new(2) },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fips_column(&frame), vec!["48201", "36061", "06037", "13121", "08031"]);
}

#[tokio::test]
async fn known_pipe_gets_the_new_counties() {
    let instance = FakeInstance::new();
    instance.preregister(&state_pipe("CA", &["06037"]));
    let sync = FakeSync::new(SyncStatus::Succeeded);

    fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&["06001", "06075"]), &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(instance.register_calls.load(Ordering::SeqCst), 0);
    assert_eq!(instance.edit_calls.load(Ordering::SeqCst), 1);
    let expected = state_pipe("CA", &["06001", "06075"]);
    assert_eq!(
        instance.parameters.lock().unwrap().get(&expected.keys),
        Some(&expected.parameters())
    );
}

#[tokio::test]
async fn no_counties_skip_provisioning_and_sync() {
    let instance = FakeInstance::new();
    let sync = FakeSync::new(SyncStatus::Failed { code: Some(2) });

    let result = fetcher(&instance, &sync, RetrievalPolicy::Abort)
        .fetch(&parameters(&[]), &FetchOptions::default())
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(instance.register_calls.load(Ordering::SeqCst), 0);
    assert!(sync.batches.lock().unwrap().is_empty());
    assert_eq!(instance.get_data_calls(), 0);
}
