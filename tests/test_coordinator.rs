mod common;
use common::*;
use fronius_bridge::channels::Event;
use fronius_bridge::coordinator::Coordinator;
use fronius_bridge::fronius::registers::*;
use fronius_bridge::prelude::*;
use std::time::Duration;

async fn coordinator(transport: &MockTransport, channels: Channels) -> Coordinator<MockTransport> {
    let coordinator = Coordinator::new(Factory::client(transport), channels);
    coordinator.init().await.unwrap();
    coordinator
}

#[tokio::test]
async fn refresh_publishes_snapshot() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    let channels = Channels::new();
    let coordinator = coordinator(&transport, channels.clone()).await;
    let mut events = channels.from_coordinator.subscribe();

    let report = coordinator.refresh().await.expect("not busy");
    assert!(report.success());

    match events.recv().await? {
        Event::Snapshot(snapshot) => assert_eq!(snapshot["acpower"], 1500.0),
        other => panic!("unexpected event {:?}", other),
    }

    let stats = coordinator.stats();
    assert_eq!(stats.cycles_run, 1);
    assert_eq!(stats.cycles_failed, 0);

    Ok(())
}

#[tokio::test]
async fn overlapping_refresh_is_skipped() {
    common_setup();

    let transport = Factory::gen24();
    let coordinator = coordinator(&transport, Channels::new()).await;
    transport.set_read_delay(Duration::from_millis(20));

    let (first, second) = futures::join!(coordinator.refresh(), coordinator.refresh());

    assert!(first.is_some());
    assert!(second.is_none());

    let stats = coordinator.stats();
    assert_eq!(stats.cycles_run, 1);
    assert_eq!(stats.cycles_skipped, 1);
}

#[tokio::test]
async fn command_during_refresh_is_skipped() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    let coordinator = coordinator(&transport, Channels::new()).await;
    transport.set_read_delay(Duration::from_millis(20));

    let (report, outcome) = futures::join!(
        coordinator.refresh(),
        coordinator.process_command(Command::SetMinimumReserve(10.0))
    );

    assert!(report.is_some());
    assert_eq!(outcome?, None);
    assert!(transport.writes().is_empty());
    assert_eq!(coordinator.stats().commands_skipped, 1);

    // free again
    transport.set_read_delay(Duration::ZERO);
    let outcome = coordinator
        .process_command(Command::SetMinimumReserve(10.0))
        .await?;
    assert_eq!(outcome, Some(CommandOutcome::Applied));
    assert_eq!(transport.written(), vec![(MINIMUM_RESERVE_ADDRESS, vec![1000])]);

    Ok(())
}

#[tokio::test]
async fn command_outcomes_are_counted() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    let coordinator = coordinator(&transport, Channels::new()).await;
    coordinator.refresh().await;

    coordinator.process_command(Command::SetExtControlMode(1)).await?;
    coordinator.process_command(Command::SetDischargeLimit(100.0)).await?;
    coordinator.process_command(Command::SetMinimumReserve(1.0)).await?;

    transport.fail_writes_to(CHARGE_RATE_ADDRESS);
    assert!(coordinator
        .process_command(Command::SetChargeLimit(100.0))
        .await
        .is_err());

    let stats = coordinator.stats();
    assert_eq!(stats.commands_applied, 1);
    assert_eq!(stats.commands_ignored, 1);
    assert_eq!(stats.commands_rejected, 1);
    assert_eq!(stats.commands_failed, 1);

    Ok(())
}

#[tokio::test]
async fn channel_driven_command() -> Result<()> {
    common_setup();

    let transport = Factory::gen24();
    let channels = Channels::new();
    let coordinator = coordinator(&transport, channels.clone()).await;
    let mut events = channels.from_coordinator.subscribe();

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start().await })
    };
    while channels.to_coordinator.receiver_count() == 0 {
        tokio::task::yield_now().await;
    }

    channels
        .to_coordinator
        .send(ChannelData::Command(Command::ApplyExportLimit(3000)))?;

    let result = loop {
        if let Event::CommandResult(topic, outcome) = events.recv().await? {
            break (topic, outcome);
        }
    };
    assert_eq!(result, ("result/set/export_limit".to_string(), Some(CommandOutcome::Applied)));
    assert_eq!(transport.get(Factory::UNIT_ID, EXPORT_LIMIT_RATE_ADDRESS), 3000);

    coordinator.stop();
    task.await??;

    Ok(())
}
