//! Microphone audio capture using cpal.
//!
//! The cpal stream lives on a dedicated thread for as long as the source is
//! open, since streams are not `Send` on every platform. Closing the source
//! signals that thread and joins it, so the device is released before
//! [`AudioSource::close`] returns.

use super::{AudioSource, SampleBlock, SourceKind};
use crate::config::AudioConfig;
use crate::error::{Result, VisageError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, bounded};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capture from a system microphone.
pub struct MicrophoneSource {
    device_name: Option<String>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    /// A source for the configured input device (system default if unset).
    ///
    /// No device is touched until [`AudioSource::open`].
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.input_device.clone(),
            stop_tx: None,
            worker: None,
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VisageError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl AudioSource for MicrophoneSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn describe(&self) -> String {
        match &self.device_name {
            Some(name) => format!("microphone '{name}'"),
            None => "default microphone".to_owned(),
        }
    }

    fn open(&mut self, tx: Sender<SampleBlock>) -> Result<()> {
        self.close();

        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let device_name = self.device_name.clone();

        let worker = std::thread::Builder::new()
            .name("visage-mic".to_owned())
            .spawn(move || {
                let stream = match start_stream(device_name.as_deref(), tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Hold the stream alive until stopped or the source is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                info!("audio capture stopped");
            })
            .map_err(|e| VisageError::Audio(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(VisageError::Audio("capture thread exited during startup".into()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("capture thread panicked during shutdown");
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the device and start a stream that forwards mono blocks to `tx`.
fn start_stream(device_name: Option<&str>, tx: Sender<SampleBlock>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| VisageError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| VisageError::Audio(format!("input device '{name}' not found")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| VisageError::Audio("no default input device".into()))?
    };

    let device_label = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_label}");

    // Use the device's default config for best compatibility
    let default_config = device
        .default_input_config()
        .map_err(|e| VisageError::Audio(format!("no default input config: {e}")))?;

    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = stream_config.channels;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if channels > 1 {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };
                // Use try_send to avoid blocking the audio thread
                if tx.try_send(mono).is_err() {
                    debug!("analyzer queue full, dropping block");
                }
            },
            move |err| {
                error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| VisageError::Audio(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VisageError::Audio(format!("failed to start input stream: {e}")))?;

    info!(channels, "audio capture started");
    Ok(stream)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_mono_averages_frames() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn describe_names_the_device() {
        let config = AudioConfig {
            input_device: Some("USB Mic".to_owned()),
            ..AudioConfig::default()
        };
        let source = MicrophoneSource::new(&config);
        assert_eq!(source.describe(), "microphone 'USB Mic'");
        assert_eq!(source.kind(), SourceKind::Microphone);
    }

    #[test]
    fn close_without_open_is_noop() {
        let mut source = MicrophoneSource::new(&AudioConfig::default());
        source.close();
        source.close();
    }
}
