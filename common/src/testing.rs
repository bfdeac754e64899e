use std::{collections::VecDeque, time::Duration};

use embedded_hal::delay::DelayNs;

use crate::{
    connectivity::WifiLink,
    delivery::Transport,
    error::{LinkError, SensorError, TransportError},
    indicators::{Frame, Indicators},
    sensors::SensorSource,
    types::{BuzzerCommand, Climate, LedState},
};

pub struct FakeSensors {
    pub climate: Result<Climate, SensorError>,
    pub raw: Result<u16, SensorError>,
    pub reads: u32,
}

impl FakeSensors {
    pub fn new(temperature_c: f32, humidity: f32, raw: u16) -> Self {
        Self {
            climate: Ok(Climate {
                temperature_c,
                humidity,
            }),
            raw: Ok(raw),
            reads: 0,
        }
    }
}

impl SensorSource for FakeSensors {
    fn read_climate(&mut self) -> Result<Climate, SensorError> {
        self.reads += 1;
        self.climate.clone()
    }

    fn read_air_quality_raw(&mut self) -> Result<u16, SensorError> {
        self.raw.clone()
    }
}

#[derive(Default)]
pub struct RecordingIndicators {
    pub leds: Vec<LedState>,
    pub buzzer: Vec<BuzzerCommand>,
    pub frames: Vec<Frame>,
}

impl RecordingIndicators {
    pub fn tones(&self) -> usize {
        self.buzzer
            .iter()
            .filter(|command| matches!(command, BuzzerCommand::Tone { .. }))
            .count()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }
}

impl Indicators for RecordingIndicators {
    fn set_leds(&mut self, leds: LedState) {
        self.leds.push(leds);
    }

    fn buzzer(&mut self, command: BuzzerCommand) {
        self.buzzer.push(command);
    }

    fn render(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }
}

/// Link that comes up `connect_after` polls after each association request,
/// or once `up_after` polls have happened in total.
pub struct FakeLink {
    pub connect_after: Option<u32>,
    pub up_after: Option<u32>,
    pub begin_error: Option<LinkError>,
    pub associations: u32,
    pub polls: u32,
    polls_since_begin: u32,
    up: bool,
    dropped: bool,
}

impl FakeLink {
    pub fn connecting_after(polls: u32) -> Self {
        Self {
            connect_after: Some(polls),
            up_after: None,
            begin_error: None,
            associations: 0,
            polls: 0,
            polls_since_begin: 0,
            up: false,
            dropped: false,
        }
    }

    pub fn never_connecting() -> Self {
        Self {
            connect_after: None,
            ..Self::connecting_after(0)
        }
    }

    pub fn up_after_polls(polls: u32) -> Self {
        Self {
            up_after: Some(polls),
            ..Self::never_connecting()
        }
    }

    /// Takes the link down until the next association request.
    pub fn drop_link(&mut self) {
        self.up = false;
        self.dropped = true;
    }
}

impl WifiLink for FakeLink {
    fn begin_association(&mut self) -> Result<(), LinkError> {
        self.associations += 1;
        self.polls_since_begin = 0;
        self.dropped = false;
        match self.begin_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_connected(&mut self) -> bool {
        self.polls += 1;
        if self.dropped {
            return false;
        }
        if self.up {
            return true;
        }
        if self.up_after.is_some_and(|after| self.polls > after) {
            self.up = true;
            return true;
        }

        match self.connect_after {
            Some(after) if self.associations > 0 && self.polls_since_begin >= after => {
                self.up = true;
            }
            _ => self.polls_since_begin += 1,
        }
        self.up
    }
}

pub type Exchange = (String, Vec<u8>, Duration);

/// Answers requests from queued results; an empty queue answers HTTP 200.
#[derive(Default)]
pub struct ScriptedTransport {
    post_results: VecDeque<Result<u16, TransportError>>,
    get_results: VecDeque<Result<u16, TransportError>>,
    pub posts: Vec<Exchange>,
    pub gets: Vec<(String, Duration)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_post(&mut self, result: Result<u16, TransportError>) {
        self.post_results.push_back(result);
    }

    pub fn push_get(&mut self, result: Result<u16, TransportError>) {
        self.get_results.push_back(result);
    }
}

impl Transport for ScriptedTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        self.posts.push((url.to_string(), body.to_vec(), timeout));
        self.post_results.pop_front().unwrap_or(Ok(200))
    }

    fn get(&mut self, url: &str, timeout: Duration) -> Result<u16, TransportError> {
        self.gets.push((url.to_string(), timeout));
        self.get_results.pop_front().unwrap_or(Ok(200))
    }
}

#[derive(Default)]
pub struct CountingDelay {
    total_ns: u64,
}

impl CountingDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}
