//! End-to-end tests: a session loading a real GeoJSON layer and answering searches.

use pip_worker::config::{PrematureSearchPolicy, WorkerConfig};
use pip_worker::protocol::{LoadRequest, Request, Response, SearchRequest};
use pip_worker::session::{self, run};
use pip_worker::types::Coords;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

fn unit_square(x: f64, y: f64) -> Value {
    json!([[[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]]])
}

fn write_layer(dir: &Path, layer: &str) -> PathBuf {
    let path = dir.join(format!("{}.geojson", layer));
    let collection = json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "id": 1, "Name": "Alpha", "Hierarchy": ["A"] },
                "geometry": { "type": "Polygon", "coordinates": unit_square(0.0, 0.0) }
            },
            {
                "type": "Feature",
                "properties": { "id": 2, "Name": "Beta", "Hierarchy": ["B"] },
                "geometry": { "type": "Polygon", "coordinates": unit_square(10.0, 10.0) }
            }
        ]
    });
    fs::write(&path, collection.to_string()).unwrap();
    path
}

fn config_for(dir: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.store.side_table_dir = dir.to_path_buf();
    config
}

fn load(layer: &str, datapath: &Path) -> Request {
    Request::Load(LoadRequest {
        layer: layer.to_string(),
        datapath: datapath.to_path_buf(),
        localized_admin_names: None,
    })
}

fn search(id: Value, longitude: f64, latitude: f64) -> Request {
    Request::Search(SearchRequest {
        id,
        coords: Coords {
            longitude,
            latitude,
        },
    })
}

async fn next(rx: &mut mpsc::Receiver<Response>) -> Response {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a response")
        .expect("response channel closed")
}

#[tokio::test]
async fn loads_layer_then_answers_searches() {
    let temp_dir = TempDir::new().unwrap();
    let dataset = write_layer(temp_dir.path(), "country");

    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, mut response_rx) = mpsc::channel(8);
    let worker = tokio::spawn(run(config_for(temp_dir.path()), request_rx, response_tx));

    request_tx.send(load("country", &dataset)).await.unwrap();
    match next(&mut response_rx).await {
        Response::Loaded { layer, seconds } => {
            assert_eq!(layer, "country");
            assert!(seconds >= 0.0);
        }
        other => panic!("expected loaded, got {:?}", other),
    }

    // The side table is complete by the time `loaded` arrives.
    let side_table: Value = serde_json::from_str(
        &fs::read_to_string(temp_dir.path().join("wof-country-data.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        side_table["1"],
        json!({ "id": 1, "Name": "Alpha", "Hierarchy": ["A"] })
    );
    assert_eq!(
        side_table["2"],
        json!({ "id": 2, "Name": "Beta", "Hierarchy": ["B"] })
    );

    request_tx.send(search(json!("a"), 0.5, 0.5)).await.unwrap();
    request_tx.send(search(json!("b"), 50.0, 50.0)).await.unwrap();

    assert_eq!(
        next(&mut response_rx).await,
        Response::Results {
            layer: "country".to_string(),
            id: json!("a"),
            results: json!({ "Hierarchy": ["A"] }).as_object().cloned().unwrap(),
        }
    );
    match next(&mut response_rx).await {
        Response::Results { id, results, .. } => {
            assert_eq!(id, json!("b"));
            assert!(results.is_empty());
        }
        other => panic!("expected results, got {:?}", other),
    }

    drop(request_tx);
    timeout(WAIT, worker).await.unwrap().unwrap();
}

#[tokio::test]
async fn searches_sent_before_load_completes_are_queued() {
    let temp_dir = TempDir::new().unwrap();
    write_layer(temp_dir.path(), "region");

    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, mut response_rx) = mpsc::channel(8);
    tokio::spawn(run(config_for(temp_dir.path()), request_rx, response_tx));

    // Directory datapath: the worker resolves region.geojson itself.
    request_tx.send(load("region", temp_dir.path())).await.unwrap();
    request_tx.send(search(json!(1), 10.5, 10.5)).await.unwrap();

    assert!(matches!(next(&mut response_rx).await, Response::Loaded { .. }));
    match next(&mut response_rx).await {
        Response::Results { id, results, .. } => {
            assert_eq!(id, json!(1));
            assert_eq!(results["Hierarchy"], json!(["B"]));
        }
        other => panic!("expected results, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_layer_reports_failure_and_never_becomes_ready() {
    let temp_dir = TempDir::new().unwrap();
    let dataset = temp_dir.path().join("locality.geojson");
    let collection = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "id": 1, "Name": "No parents" },
            "geometry": { "type": "Polygon", "coordinates": unit_square(0.0, 0.0) }
        }]
    });
    fs::write(&dataset, collection.to_string()).unwrap();

    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, mut response_rx) = mpsc::channel(8);
    tokio::spawn(run(config_for(temp_dir.path()), request_rx, response_tx));

    request_tx.send(load("locality", &dataset)).await.unwrap();
    match next(&mut response_rx).await {
        Response::LoadFailed { layer, error } => {
            assert_eq!(layer, "locality");
            assert!(error.contains("Hierarchy"));
        }
        other => panic!("expected load-failed, got {:?}", other),
    }
    assert!(!temp_dir.path().join("wof-locality-data.json").exists());

    request_tx.send(search(json!(7), 0.5, 0.5)).await.unwrap();
    match next(&mut response_rx).await {
        Response::Results { id, results, .. } => {
            assert_eq!(id, json!(7));
            assert!(results.is_empty());
        }
        other => panic!("expected results, got {:?}", other),
    }
}

#[tokio::test]
async fn reject_policy_answers_before_load_without_waiting() {
    let mut config = WorkerConfig::default();
    config.session.premature_search = PrematureSearchPolicy::Reject;

    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, mut response_rx) = mpsc::channel(8);
    tokio::spawn(run(config, request_rx, response_tx));

    request_tx.send(search(json!(3), 0.5, 0.5)).await.unwrap();
    assert_eq!(
        next(&mut response_rx).await,
        Response::Results {
            layer: String::new(),
            id: json!(3),
            results: Default::default(),
        }
    );
}

#[tokio::test]
async fn serves_newline_delimited_json() {
    let temp_dir = TempDir::new().unwrap();
    let dataset = write_layer(temp_dir.path(), "country");

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let worker = tokio::spawn(session::serve(
        config_for(temp_dir.path()),
        BufReader::new(server_read),
        server_write,
    ));

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();

    let load_line = json!({
        "type": "load",
        "layer": "country",
        "datapath": dataset,
        "localizedAdminNames": { "1": "Alfa" }
    });
    client_write
        .write_all(format!("{}\n", load_line).as_bytes())
        .await
        .unwrap();
    client_write.write_all(b"{\"type\":\"ping\"}\n").await.unwrap();
    client_write
        .write_all(b"{\"type\":\"search\",\"id\":99,\"coords\":{\"longitude\":0.25,\"latitude\":0.75}}\n")
        .await
        .unwrap();

    let loaded: Value =
        serde_json::from_str(&timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap())
            .unwrap();
    assert_eq!(loaded["type"], json!("loaded"));
    assert_eq!(loaded["layer"], json!("country"));

    let results: Value =
        serde_json::from_str(&timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap())
            .unwrap();
    assert_eq!(
        results,
        json!({ "type": "results", "layer": "country", "id": 99, "results": { "Hierarchy": ["A"] } })
    );

    let side_table: Value = serde_json::from_str(
        &fs::read_to_string(temp_dir.path().join("wof-country-data.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(side_table["1"]["Name"], json!("Alfa"));

    client_write.shutdown().await.unwrap();
    drop(client_write);
    timeout(WAIT, worker).await.unwrap().unwrap().unwrap();
}
