use anyhow::{bail, ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::time::Duration;

use nyanos::eeprom_map::SIZE_FPGA_BITSTREAM;
use nyanos::strings;

/// Payload chunk size for uploads. The device captures into RAM as fast
/// as the CDC endpoint delivers, but small chunks keep host-side buffering
/// from outrunning a busy keyboard.
const UPLOAD_CHUNK: usize = 64;

/// Pause between upload chunks.
const UPLOAD_CHUNK_DELAY: Duration = Duration::from_millis(2);

/// Reads allowed while waiting for a response marker before giving up.
const MAX_READS: usize = 4096;

/// A NyanOS console session over the keyboard's CDC ACM device node.
pub struct Console {
    port: File,
}

impl Console {
    pub fn open(path: &str) -> Result<Self> {
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening console port {}", path))?;
        Ok(Self { port })
    }

    /// Send one command line and collect everything up to the next prompt.
    pub fn command(&mut self, line: &str) -> Result<String> {
        self.port
            .write_all(line.as_bytes())
            .context("writing command")?;
        self.port.write_all(b"\r").context("writing command")?;
        self.read_until(strings::PATH_TEXT)
    }

    /// Accumulate console output until `marker` appears.
    fn read_until(&mut self, marker: &str) -> Result<String> {
        let mut response = Vec::new();
        let mut buf = [0u8; 256];
        for _ in 0..MAX_READS {
            let n = self.port.read(&mut buf).context("reading console")?;
            if n == 0 {
                bail!("console closed while waiting for response");
            }
            response.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&response);
            if text.contains(marker) {
                return Ok(text.into_owned());
            }
        }
        bail!("no response marker after {} reads", MAX_READS);
    }

    /// Upload a compressed bitstream through `write-bitstream` and verify
    /// the hash the device echoes back.
    pub fn upload_bitstream(&mut self, compressed: &[u8]) -> Result<()> {
        ensure!(!compressed.is_empty(), "compressed bitstream is empty");
        ensure!(
            compressed.len() <= u16::MAX as usize,
            "compressed bitstream is {} bytes, the length record caps at 65535",
            compressed.len()
        );
        ensure!(
            compressed.len() <= SIZE_FPGA_BITSTREAM,
            "compressed bitstream is {} bytes, the EEPROM region holds {}",
            compressed.len(),
            SIZE_FPGA_BITSTREAM
        );

        self.port
            .write_all(format!("write-bitstream {}\r", compressed.len()).as_bytes())
            .context("sending write-bitstream command")?;
        self.read_until(strings::WRITE_BITSTREAM_START)
            .context("device did not accept the upload")?;

        let pb = ProgressBar::new(compressed.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} bytes")
                .unwrap()
                .progress_chars("=> "),
        );
        pb.set_message("Uploading");

        for chunk in compressed.chunks(UPLOAD_CHUNK) {
            self.port.write_all(chunk).context("uploading payload")?;
            std::thread::sleep(UPLOAD_CHUNK_DELAY);
            pb.inc(chunk.len() as u64);
        }
        pb.finish_with_message("Uploaded");

        // The device hashes the captured payload and prints it before
        // committing to EEPROM; mismatch means the transfer corrupted.
        let response = self.read_until(strings::PATH_TEXT)?;
        let digest: [u8; 32] = Sha256::digest(compressed).into();
        let expected: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        if !response.contains(&expected) {
            bail!(
                "device hash does not match upload (expected {})\ndevice said:\n{}",
                expected,
                response
            );
        }
        ensure!(
            response.contains(strings::WRITE_BITSTREAM_SUCCESS.trim_end()),
            "device did not confirm the EEPROM write:\n{}",
            response
        );
        Ok(())
    }
}
