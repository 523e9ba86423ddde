//! Real-hardware audio port backed by `cpal`.
//!
//! Shaped directly after `bbx_player::backends::cpal::CpalBackend`: a
//! background thread owns the actual input/output streams, coordinated
//! with the caller via an `Arc<AtomicBool>` stop flag and the shared
//! bounded input queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use aflink_core::{sample_queue, CoreError, QueueConsumer, QueueProducer, Result, SampleBlock};

use crate::AudioPort;

/// Audio port backed by the system's default input/output devices.
pub struct CpalAudioPort {
    host: cpal::Host,
    input_device: Option<cpal::Device>,
    output_device: Option<cpal::Device>,
    sample_rate: u32,
    input_queue_tx: QueueProducer,
    input_queue_rx: QueueConsumer,
    input_stream: Option<cpal::Stream>,
    transmitting: Arc<AtomicBool>,
    running: bool,
}

const ECHO_GUARD: Duration = Duration::from_millis(80);

impl CpalAudioPort {
    /// Open the host's default input and output devices.
    pub fn try_default(queue_capacity: usize) -> Result<Self> {
        let host = cpal::default_host();
        let input_device = host.default_input_device();
        let output_device = host.default_output_device();

        if input_device.is_none() && output_device.is_none() {
            return Err(CoreError::AudioUnavailable);
        }

        let sample_rate = output_device
            .as_ref()
            .or(input_device.as_ref())
            .and_then(|d| d.default_output_config().ok().or_else(|| d.default_input_config().ok()))
            .map(|c| c.sample_rate().0)
            .unwrap_or(48_000);

        let (tx, rx) = sample_queue(queue_capacity);

        Ok(Self {
            host,
            input_device,
            output_device,
            sample_rate,
            input_queue_tx: tx,
            input_queue_rx: rx,
            input_stream: None,
            transmitting: Arc::new(AtomicBool::new(false)),
            running: false,
        })
    }

    fn build_input_stream(&mut self) -> Result<()> {
        let Some(device) = self.input_device.clone() else { return Ok(()) };
        let config = device.default_input_config().map_err(|_| CoreError::AudioUnavailable)?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let mut producer = self.input_queue_tx.clone();
        let transmitting = Arc::clone(&self.transmitting);

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    if transmitting.load(Ordering::Acquire) {
                        return;
                    }
                    let mono: Vec<f32> = if channels > 1 {
                        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
                    } else {
                        data.to_vec()
                    };
                    producer.push(SampleBlock::new(mono, sample_rate));
                },
                move |_err| {
                    eprintln!("aflink_audio: input stream error");
                },
                None,
            )
            .map_err(|_| CoreError::AudioUnavailable)?;

        stream.play().map_err(|_| CoreError::AudioUnavailable)?;
        self.input_stream = Some(stream);
        Ok(())
    }
}

impl AudioPort for CpalAudioPort {
    fn start(&mut self) -> Result<()> {
        self.clear_input();
        self.build_input_stream()?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.input_stream = None;
        self.running = false;
        Ok(())
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn transmit(&mut self, block: &SampleBlock, blocking: bool) -> Result<()> {
        if !self.running {
            return Err(CoreError::NotRunning);
        }
        let Some(device) = self.output_device.clone() else {
            return Err(CoreError::AudioUnavailable);
        };
        let config = device.default_output_config().map_err(|_| CoreError::AudioUnavailable)?;

        self.clear_input();
        self.transmitting.store(true, Ordering::Release);

        let samples = block.samples.clone();
        let mut index = 0usize;
        let done = Arc::new(AtomicBool::new(false));
        let done_writer = Arc::clone(&done);

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _| {
                    for sample in data.iter_mut() {
                        *sample = samples.get(index).copied().unwrap_or(0.0);
                        index += 1;
                    }
                    if index >= samples.len() {
                        done_writer.store(true, Ordering::Release);
                    }
                },
                move |_err| {
                    eprintln!("aflink_audio: output stream error");
                },
                None,
            )
            .map_err(|_| CoreError::AudioUnavailable)?;

        stream.play().map_err(|_| CoreError::AudioUnavailable)?;

        if blocking {
            let deadline = Instant::now() + Duration::from_secs_f64(block.len() as f64 / self.sample_rate as f64 + 0.5);
            while !done.load(Ordering::Acquire) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        self.transmitting.store(false, Ordering::Release);
        std::thread::sleep(ECHO_GUARD);
        self.clear_input();
        Ok(())
    }

    fn receive_until_silence(
        &mut self,
        threshold: f32,
        min_samples: usize,
        silence_duration: f64,
        timeout: Duration,
    ) -> Result<SampleBlock> {
        if !self.running {
            return Err(CoreError::NotRunning);
        }

        let deadline = Instant::now() + timeout;
        let mut merged = SampleBlock::silence(0, self.sample_rate);
        let mut signal_detected = false;
        let mut last_activity = Instant::now();
        let quiet_window = Duration::from_secs_f64(silence_duration);

        loop {
            if Instant::now() >= deadline {
                break;
            }
            match self.input_queue_rx.pop() {
                Some(block) => {
                    if block.rms() > 2.0 * threshold {
                        signal_detected = true;
                    }
                    merged.append(&block);
                    last_activity = Instant::now();
                }
                None => {
                    if signal_detected && last_activity.elapsed() >= quiet_window {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
        }

        if merged.len() < min_samples && !signal_detected {
            return Ok(SampleBlock::silence(0, self.sample_rate));
        }
        Ok(merged)
    }

    fn clear_input(&mut self) {
        while self.input_queue_rx.pop().is_some() {}
    }
}
