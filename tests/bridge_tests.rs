//! Station running on a blocking thread, controller played by an async task

#![cfg(feature = "bridge")]

use dcc_station::codec::{encode_frame, DecodeEvent, FrameDecoder};
use dcc_station::commands::SpeedSteps;
use dcc_station::hal::{channel_pair, SystemClock};
use dcc_station::protocol::{command, telemetry};
use dcc_station::CommandStation;

#[tokio::test(flavor = "multi_thread")]
async fn cv_read_answered_across_the_bridge() {
    let (port, mut peer) = channel_pair(64);

    let controller = tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut requests = 0;
        while let Some(chunk) = peer.from_station.recv().await {
            for byte in chunk {
                let Some(DecodeEvent::Frame(frame)) = decoder.push(byte) else {
                    continue;
                };
                if frame[0] == command::PGM_READ_CV {
                    requests += 1;
                    let reply =
                        encode_frame(&[telemetry::PGM_CV_RESULT, frame[1], frame[2], 1, 42])
                            .unwrap();
                    peer.to_station.send(reply.to_vec()).await.unwrap();
                }
            }
        }
        requests
    });

    let value = tokio::task::spawn_blocking(move || {
        let mut station = CommandStation::new(port, SystemClock::new());
        station.pgm_read_cv(29)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(value, 42);
    assert_eq!(controller.await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduled_packets_reach_the_controller() {
    let (port, mut peer) = channel_pair(64);

    tokio::task::spawn_blocking(move || {
        let mut station = CommandStation::new(port, SystemClock::new());
        let loco = station.add_locomotive(3, SpeedSteps::Steps28).unwrap();
        station.set_speed(loco, 12).unwrap();
        for _ in 0..4 {
            station.tick().unwrap();
        }
    })
    .await
    .unwrap();

    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    while let Some(chunk) = peer.from_station.recv().await {
        frames.extend(chunk.into_iter().filter_map(|b| match decoder.push(b) {
            Some(DecodeEvent::Frame(frame)) => Some(frame),
            _ => None,
        }));
    }

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].as_slice(), &[command::SPEED_28, 0, 3, 0x80 | 12]);
    assert_eq!(frames[1][0], command::FUNCTION_GROUP);
}
