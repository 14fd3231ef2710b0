mod common;
use common::*;
use fronius_bridge::fronius::solar_api::{SolarApi, DEFAULT_STORAGE_MODEL};
use fronius_bridge::prelude::*;
use std::time::Duration;

const PATH: &str = "/solar_api/v1/GetStorageRealtimeData.cgi";

const STORAGE_REPLY: &str = r#"{
    "Body": {
        "Data": {
            "0": {
                "Controller": {
                    "Capacity_Maximum": 10240,
                    "Details": {
                        "Manufacturer": "BYD",
                        "Model": "BYD Battery-Box Premium HV",
                        "Serial": "P030T020Z2010123"
                    },
                    "StateOfCharge_Relative": 55.5
                }
            }
        }
    },
    "Head": {"Status": {"Code": 0}}
}"#;

#[tokio::test]
async fn names_the_battery() -> Result<()> {
    common_setup();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(STORAGE_REPLY)
        .create_async()
        .await;

    let api = SolarApi::new(&server.url(), Duration::from_secs(2))?;
    let identity = api.storage_info().await.expect("storage identity");

    mock.assert_async().await;
    assert_eq!(identity.manufacturer.as_deref(), Some("BYD"));
    assert_eq!(identity.model.as_deref(), Some("BYD Battery-Box Premium HV"));
    assert_eq!(identity.serial.as_deref(), Some("P030T020Z2010123"));

    Ok(())
}

#[tokio::test]
async fn unusable_replies() -> Result<()> {
    common_setup();

    let mut server = mockito::Server::new_async().await;
    let api = SolarApi::new(&server.url(), Duration::from_secs(2))?;

    let mock = server
        .mock("GET", PATH)
        .with_status(500)
        .create_async()
        .await;
    assert_eq!(api.storage_info().await, None);
    mock.remove_async().await;

    let mock = server
        .mock("GET", PATH)
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;
    assert_eq!(api.storage_info().await, None);
    mock.remove_async().await;

    server
        .mock("GET", PATH)
        .with_status(200)
        .with_body(r#"{"Body": {"Data": {}}}"#)
        .create_async()
        .await;
    assert_eq!(api.storage_info().await, None);

    Ok(())
}

#[tokio::test]
async fn default_model() -> Result<()> {
    common_setup();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", PATH)
        .with_status(200)
        .with_body(r#"{"Body": {"Data": {"0": {"Controller": {"Details": {"Serial": "X1"}}}}}}"#)
        .create_async()
        .await;

    let api = SolarApi::new(&server.url(), Duration::from_secs(2))?;
    let identity = api.storage_info().await.expect("storage identity");
    assert_eq!(identity.model.as_deref(), Some(DEFAULT_STORAGE_MODEL));

    Ok(())
}

#[tokio::test]
async fn stored_as_storage_identity() -> Result<()> {
    common_setup();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", PATH)
        .with_status(200)
        .with_body(STORAGE_REPLY)
        .create_async()
        .await;

    let transport = Factory::gen24();
    let mut client = Factory::ready_client(&transport).await;
    let api = SolarApi::new(&server.url(), Duration::from_secs(2))?;

    assert!(client.read_storage_info(&api).await);
    assert_eq!(client.snapshot()["s_manufacturer"], "BYD");

    Ok(())
}

#[tokio::test]
async fn unreachable_api() -> Result<()> {
    common_setup();

    // nothing listens on the discard port
    let api = SolarApi::new("http://127.0.0.1:9", Duration::from_millis(500))?;
    assert_eq!(api.storage_info().await, None);

    Ok(())
}
