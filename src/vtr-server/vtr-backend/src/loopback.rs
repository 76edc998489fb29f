// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Loopback deck backend for development and testing.
//!
//! Holds deck state in memory and models a transport well enough to drive
//! the bridge end to end: motion commands move the flag set, sense
//! requests answer on the event stream. No hardware or serial port
//! required.

use tokio::sync::broadcast;

use vtr_core::deck::{DeckOpFuture, DeckTransport};
use vtr_core::{DeckCommand, DeckEvent, Timecode};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Device-type code the loopback reports.
const LOOPBACK_DEVICE_TYPE: u16 = 0x2025;

pub struct LoopbackDeck {
    open: bool,
    flags: Vec<String>,
    timecode: Timecode,
    standby: bool,
    cassette_in: bool,
    events: broadcast::Sender<DeckEvent>,
}

impl LoopbackDeck {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            open: false,
            flags: vec!["STOP".to_string()],
            timecode: Timecode::default(),
            standby: false,
            cassette_in: true,
            events,
        }
    }

    fn emit(&self, event: DeckEvent) {
        // No subscribers is fine; events are best-effort.
        let _ = self.events.send(event);
    }

    fn set_motion(&mut self, flags: &[&str]) {
        self.flags = flags.iter().map(|f| f.to_string()).collect();
        if self.standby {
            self.flags.push("STANDBY".to_string());
        }
    }

    fn is_playing(&self) -> bool {
        self.flags.iter().any(|f| f == "PLAY")
    }

    /// Advance one frame per sense while in play, so repeated polls see
    /// tape motion.
    fn tick_timecode(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.timecode.frames += 1;
        if self.timecode.frames >= 25 {
            self.timecode.frames = 0;
            self.timecode.seconds += 1;
            if self.timecode.seconds >= 60 {
                self.timecode.seconds = 0;
                self.timecode.minutes += 1;
                if self.timecode.minutes >= 60 {
                    self.timecode.minutes = 0;
                    self.timecode.hours = (self.timecode.hours + 1) % 24;
                }
            }
        }
    }

    fn handle(&mut self, cmd: DeckCommand) {
        // Motion requests against an empty drive NAK, like a real deck.
        if !self.cassette_in && requires_cassette(&cmd) {
            self.emit(DeckEvent::Nak {
                reasons: vec!["CASSETTE OUT".to_string()],
            });
            return;
        }

        match cmd {
            DeckCommand::Play | DeckCommand::SyncPlay => {
                self.set_motion(&["PLAY", "SERVO_LOCK"])
            }
            DeckCommand::Stop => self.set_motion(&["STOP"]),
            DeckCommand::FastForward => self.set_motion(&["FORWARD", "SHUTTLE"]),
            DeckCommand::Rewind => self.set_motion(&["REWIND", "SHUTTLE"]),
            DeckCommand::Record => self.set_motion(&["RECORD", "SERVO_LOCK"]),
            DeckCommand::Eject => {
                self.cassette_in = false;
                self.set_motion(&["EJECT", "CASSETTE_OUT"]);
            }
            DeckCommand::StandbyOn => {
                self.standby = true;
                if !self.flags.iter().any(|f| f == "STANDBY") {
                    self.flags.push("STANDBY".to_string());
                }
            }
            DeckCommand::StandbyOff => {
                self.standby = false;
                self.flags.retain(|f| f != "STANDBY");
            }
            DeckCommand::Preview | DeckCommand::Review => {
                self.set_motion(&["PLAY", "SERVO_LOCK"])
            }
            DeckCommand::FrameStepForward => {
                self.timecode.frames = (self.timecode.frames + 1) % 25;
                self.set_motion(&["STILL", "JOG"]);
            }
            DeckCommand::FrameStepReverse => {
                self.timecode.frames = self.timecode.frames.saturating_sub(1);
                self.set_motion(&["STILL", "JOG"]);
            }
            DeckCommand::Jog { .. } => self.set_motion(&["JOG"]),
            DeckCommand::VarSpeed { .. } => self.set_motion(&["VAR"]),
            DeckCommand::Shuttle { .. } => self.set_motion(&["SHUTTLE"]),
            DeckCommand::CueUp(tc) => {
                self.timecode = tc;
                self.set_motion(&["CUE_UP", "STILL"]);
            }
            DeckCommand::StatusSense { .. } => {
                self.emit(DeckEvent::Status {
                    flags: self.flags.clone(),
                });
                return;
            }
            DeckCommand::CurrentTimeSense(_) => {
                self.tick_timecode();
                self.emit(DeckEvent::Timecode(self.timecode));
                return;
            }
            DeckCommand::DeviceTypeSense => {
                self.emit(DeckEvent::DeviceType(LOOPBACK_DEVICE_TYPE));
                return;
            }
            // Entry/preset/sense helpers are accepted and acknowledged
            // without modeling the edit registers.
            DeckCommand::InEntry
            | DeckCommand::OutEntry
            | DeckCommand::InDataPreset(_)
            | DeckCommand::OutDataPreset(_)
            | DeckCommand::PrerollPreset(_)
            | DeckCommand::AutoModeOn
            | DeckCommand::AutoModeOff
            | DeckCommand::InputCheck
            | DeckCommand::TcGenSense
            | DeckCommand::InDataSense
            | DeckCommand::OutDataSense => {}
        }

        self.emit(DeckEvent::Ack);
    }
}

impl Default for LoopbackDeck {
    fn default() -> Self {
        Self::new()
    }
}

fn requires_cassette(cmd: &DeckCommand) -> bool {
    matches!(
        cmd,
        DeckCommand::Play
            | DeckCommand::SyncPlay
            | DeckCommand::Record
            | DeckCommand::FastForward
            | DeckCommand::Rewind
            | DeckCommand::Preview
            | DeckCommand::Review
            | DeckCommand::CueUp(_)
    )
}

impl DeckTransport for LoopbackDeck {
    fn open<'a>(&'a mut self) -> DeckOpFuture<'a> {
        self.open = true;
        Box::pin(async { Ok(()) })
    }

    fn close<'a>(&'a mut self) -> DeckOpFuture<'a> {
        self.open = false;
        Box::pin(async { Ok(()) })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send<'a>(&'a mut self, cmd: DeckCommand) -> DeckOpFuture<'a> {
        if !self.open {
            return Box::pin(async { Err("port not open".into()) });
        }
        self.handle(cmd);
        Box::pin(async { Ok(()) })
    }

    fn subscribe_events(&self) -> broadcast::Receiver<DeckEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_requires_open_port() {
        let mut deck = LoopbackDeck::new();
        assert!(!deck.is_open());
        assert!(deck.send(DeckCommand::Play).await.is_err());

        deck.open().await.unwrap();
        assert!(deck.is_open());
        assert!(deck.send(DeckCommand::Play).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_sense_reports_motion_flags() {
        let mut deck = LoopbackDeck::new();
        let mut events = deck.subscribe_events();
        deck.open().await.unwrap();

        deck.send(DeckCommand::Play).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), DeckEvent::Ack));

        deck.send(DeckCommand::StatusSense { start: 0, size: 10 })
            .await
            .unwrap();
        match events.recv().await.unwrap() {
            DeckEvent::Status { flags } => {
                assert!(flags.iter().any(|f| f == "PLAY"));
                assert!(flags.iter().any(|f| f == "SERVO_LOCK"));
            }
            other => panic!("expected status event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_time_sense_advances_during_play() {
        let mut deck = LoopbackDeck::new();
        let mut events = deck.subscribe_events();
        deck.open().await.unwrap();

        deck.send(DeckCommand::CueUp(Timecode::new(1, 0, 0, 0)))
            .await
            .unwrap();
        let _ = events.recv().await.unwrap(); // ack
        deck.send(DeckCommand::Play).await.unwrap();
        let _ = events.recv().await.unwrap(); // ack

        deck.send(DeckCommand::CurrentTimeSense(Default::default()))
            .await
            .unwrap();
        match events.recv().await.unwrap() {
            DeckEvent::Timecode(tc) => assert_eq!(tc, Timecode::new(1, 0, 0, 1)),
            other => panic!("expected timecode event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_motion_after_eject_naks() {
        let mut deck = LoopbackDeck::new();
        let mut events = deck.subscribe_events();
        deck.open().await.unwrap();

        deck.send(DeckCommand::Eject).await.unwrap();
        let _ = events.recv().await.unwrap(); // ack

        deck.send(DeckCommand::Play).await.unwrap();
        match events.recv().await.unwrap() {
            DeckEvent::Nak { reasons } => {
                assert_eq!(reasons, vec!["CASSETTE OUT".to_string()]);
            }
            other => panic!("expected nak event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_device_type_sense() {
        let mut deck = LoopbackDeck::new();
        let mut events = deck.subscribe_events();
        deck.open().await.unwrap();

        deck.send(DeckCommand::DeviceTypeSense).await.unwrap();
        match events.recv().await.unwrap() {
            DeckEvent::DeviceType(code) => assert_eq!(code, 0x2025),
            other => panic!("expected device type event, got {:?}", other),
        }
    }
}
