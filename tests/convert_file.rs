use std::fs;
use std::path::Path;
use std::time::Duration;

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use serde_json::{json, Value};
use tempfile::tempdir;

use aid_location_converter::{AppConfig, AppError, Converter, EnrichedRecord};

const SAMPLE_CSV: &str = "Espacio,TIPO,COMUNA,DIRECCIÓN,MÁS INFO,Horario de Inicio,Horario de fin,Dias (ordenar columnas) (Semana del 19),CONTACTO\n\
Sede Vecinal Los Pinos,Acopio,Quilpué,Los Carrera 120,\"agua, leche, pañales\",09:00,18:00,Lunes a Viernes,+56 9 1111 2222\n\
Bomberos Tercera Compañía,Albergue,Viña del Mar,,,,,,\n\
Parroquia San Pedro,Acopio,Quilpué,los carrera 120,ropa,10:00,14:00,Sábado,\n\
Punto Sin Mapa,Voluntariado,Limache,Pasaje Desconocido 0,,,,,\n";

fn expect_search(server: &Server, query: &'static str, times: usize, body: Value) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("q", query)))),
        ])
        .times(times)
        .respond_with(json_encoded(body)),
    );
}

fn config_for(server: &Server, dir: &Path) -> AppConfig {
    let input = dir.join("data.csv");
    fs::write(&input, SAMPLE_CSV).unwrap();
    AppConfig {
        input_path: input,
        output_path: dir.join("out").join("data.json"),
        cache_path: dir.join("geocache.json"),
        worker_count: 3,
        rate_limit_interval: Duration::from_millis(5),
        geocoder_endpoint: server.url("/").to_string(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn converts_csv_and_reuses_cache_on_second_run() {
    let mut server = Server::run();
    let dir = tempdir().unwrap();
    let config = AppConfig {
        worker_count: 1,
        ..config_for(&server, dir.path())
    };

    // "los carrera 120" normalizes to the same key and is served from cache.
    expect_search(
        &server,
        "Los Carrera 120, Chile",
        1,
        json!([{ "lat": "-33.04751234", "lon": "-71.44210987" }]),
    );
    expect_search(&server, "Pasaje Desconocido 0, Chile", 1, json!([]));

    let converter = Converter::from_config(config.clone()).unwrap();
    let first = converter.convert_file().await.unwrap();
    server.verify_and_clear();

    assert_eq!(first.stats.total, 4);
    assert_eq!(first.stats.processed, 4);
    assert_eq!(first.stats.geocode_success, 2);
    assert_eq!(first.stats.geocode_failure, 1);
    assert_eq!(first.stats.geocode_skipped, 1);
    assert_eq!(first.stats.lookups, 2);
    assert_eq!(first.stats.cache_hits, 1);

    let written: Vec<EnrichedRecord> =
        serde_json::from_str(&fs::read_to_string(&config.output_path).unwrap()).unwrap();
    assert_eq!(written, first.records);
    let names: Vec<_> = written.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Sede Vecinal Los Pinos",
            "Bomberos Tercera Compañía",
            "Parroquia San Pedro",
            "Punto Sin Mapa"
        ]
    );
    assert_eq!(written[0].lat, Some(-33.047512));
    assert_eq!(written[0].lng, Some(-71.44211));
    assert_eq!(written[0].supplies_needed, vec!["agua", "leche", "pañales"]);
    assert_eq!(written[0].kind, "acopio");
    assert_eq!(written[1].lat, None);
    assert_eq!(written[2].lat, written[0].lat);
    assert_eq!(written[3].lat, None);

    let cache: Value =
        serde_json::from_str(&fs::read_to_string(&config.cache_path).unwrap()).unwrap();
    let entries = cache.as_object().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["los carrera 120, chile"]["lat"], json!(-33.047512));
    assert!(!entries.contains_key("pasaje desconocido 0, chile"));

    // Only the address that failed before is looked up again.
    expect_search(&server, "Pasaje Desconocido 0, Chile", 1, json!([]));
    let second = Converter::from_config(config.clone())
        .unwrap()
        .convert_file()
        .await
        .unwrap();
    server.verify_and_clear();

    assert_eq!(second.stats.lookups, 1);
    assert!(second.stats.lookups <= first.stats.lookups);
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(second.records[0].coordinate(), first.records[0].coordinate());
}

#[tokio::test]
async fn force_refresh_ignores_existing_cache() {
    let server = Server::run();
    let dir = tempdir().unwrap();
    let config = AppConfig {
        worker_count: 1,
        force_refresh: true,
        ..config_for(&server, dir.path())
    };
    fs::write(
        &config.cache_path,
        r#"{"los carrera 120, chile":{"address":"los carrera 120, chile","lat":1.0,"lng":1.0,"timestamp":"2024-02-04T00:00:00Z"}}"#,
    )
    .unwrap();

    expect_search(
        &server,
        "Los Carrera 120, Chile",
        1,
        json!([{ "lat": "-33.0475", "lon": "-71.4421" }]),
    );
    expect_search(&server, "Pasaje Desconocido 0, Chile", 1, json!([]));

    let output = Converter::from_config(config.clone())
        .unwrap()
        .convert_file()
        .await
        .unwrap();

    assert_eq!(output.records[0].lat, Some(-33.0475));
    assert_eq!(output.stats.cache_hits, 1);
    let cache: Value =
        serde_json::from_str(&fs::read_to_string(&config.cache_path).unwrap()).unwrap();
    assert_eq!(cache["los carrera 120, chile"]["lat"], json!(-33.0475));
}

#[tokio::test]
async fn skip_geocoding_writes_output_without_network() {
    let server = Server::run();
    let dir = tempdir().unwrap();
    let config = AppConfig {
        skip_geocoding: true,
        ..config_for(&server, dir.path())
    };

    let output = Converter::from_config(config.clone())
        .unwrap()
        .convert_file()
        .await
        .unwrap();

    assert_eq!(output.stats.geocode_skipped, 4);
    assert_eq!(output.stats.lookups, 0);
    assert!(output.cache.is_none());
    assert!(config.output_path.exists());
    assert!(!config.cache_path.exists());
}

#[tokio::test]
async fn missing_input_is_fatal() {
    let server = Server::run();
    let dir = tempdir().unwrap();
    let config = AppConfig {
        input_path: dir.path().join("absent.csv"),
        ..config_for(&server, dir.path())
    };

    let err = Converter::from_config(config)
        .unwrap()
        .convert_file()
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Input(_)));
}
