mod common;
use common::*;
use fronius_bridge::fronius::registers::*;
use fronius_bridge::prelude::*;

#[tokio::test]
async fn full_battery_starts_discharging() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    let mut client = Factory::ready_client(&transport).await;
    client.refresh().await;
    client.set_block_charge_mode().await?;

    // the inverter moved to discharge and the battery filled up
    Factory::storage_block(&transport, StorageControlMode::Discharge, 100.0, 100.0, 100.0);
    transport.clear_writes();

    let report = client.refresh().await;
    assert_eq!(report.storage, Some(true));
    assert_eq!(
        transport.written(),
        vec![
            (STORAGE_CONTROL_MODE_ADDRESS, vec![1]),
            (CHARGE_RATE_ADDRESS, vec![0]),
            (DISCHARGE_RATE_ADDRESS, vec![10000]),
        ]
    );

    let storage = client.telemetry().storage();
    assert_eq!(storage.ext_mode, Some(ExtControlMode::BlockCharging));
    assert_eq!(storage.mode, Some(StorageControlMode::Charge));

    Ok(())
}

#[tokio::test]
async fn empty_battery_restores_auto() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    let mut client = Factory::ready_client(&transport).await;
    client.refresh().await;
    client.set_block_charge_mode().await?;

    Factory::storage_block(&transport, StorageControlMode::ChargeAndDischarge, 0.0, 100.0, 5.0);
    transport.clear_writes();

    client.refresh().await;
    assert_eq!(
        transport.written(),
        vec![
            (STORAGE_CONTROL_MODE_ADDRESS, vec![0]),
            (CHARGE_RATE_ADDRESS, vec![10000]),
            (DISCHARGE_RATE_ADDRESS, vec![10000]),
            (MINIMUM_RESERVE_ADDRESS, vec![3000]),
        ]
    );
    assert_eq!(client.telemetry().storage().ext_mode, Some(ExtControlMode::Auto));
    assert_eq!(client.telemetry().storage().minimum_reserve, Some(30.0));

    // nothing more to do once back in auto
    transport.clear_writes();
    client.refresh().await;
    assert!(transport.writes().is_empty());

    Ok(())
}

#[tokio::test]
async fn only_watches_calibrating_modes() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    Factory::storage_block(&transport, StorageControlMode::Discharge, 100.0, 100.0, 100.0);

    let mut client = Factory::ready_client(&transport).await;
    client.refresh().await;

    assert_eq!(
        client.telemetry().storage().ext_mode,
        Some(ExtControlMode::DischargeLimit)
    );
    assert!(transport.writes().is_empty());

    Ok(())
}

#[tokio::test]
async fn read_only_failsafe_does_not_fail_the_poll() {
    common_setup();

    let transport = Factory::gen24();
    Factory::storage_block(&transport, StorageControlMode::ChargeAndDischarge, 0.0, 100.0, 3.0);

    let mut inverter = Factory::inverter();
    inverter.read_only = Some(true);
    let mut client = Factory::client_for(&transport, &inverter);
    client.init_data().await.unwrap();

    // derived as block charging, soc 3: the failsafe wants to write
    let report = client.refresh().await;
    assert_eq!(report.storage, Some(true));
    assert_eq!(
        client.telemetry().storage().ext_mode,
        Some(ExtControlMode::BlockCharging)
    );
    assert!(transport.writes().is_empty());
}
