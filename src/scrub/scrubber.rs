//! Stream Scrubber
//!
//! Write-through filter over an output sink. The streaming path keeps a
//! carry of `max(3, max_secret_len - 1)` processed bytes between writes so
//! secrets straddling chunk boundaries still match; the 3-byte floor keeps
//! multi-byte code points intact. Frames buffer everything until
//! `end_frame` runs the provider once over the whole buffer, fail-closed.
//!
//! All mutable state sits behind one mutex. `close` calls `flush` (which
//! takes the lock) before reacquiring to zeroise, so every public
//! operation stays lock-then-release.

use std::io::Write;
use std::sync::Mutex;
use std::sync::MutexGuard;

use zeroize::Zeroize;

use crate::scrub::placeholder::PlaceholderGenerator;
use crate::scrub::provider::{SecretPattern, SecretProvider, VariantProvider};
use crate::scrub::ScrubError;

/// Placeholder function: secret bytes -> replacement bytes.
pub type PlaceholderFn = Box<dyn Fn(&[u8]) -> Vec<u8> + Send>;

struct Frame {
    label: String,
    buf: Vec<u8>,
}

struct ScrubberState {
    sink: Box<dyn Write + Send>,
    provider: Option<Box<dyn SecretProvider>>,
    placeholder: Option<PlaceholderFn>,
    carry: Vec<u8>,
    frames: Vec<Frame>,
    closed: bool,
}

impl ScrubberState {
    fn stream_write(&mut self, bytes: &[u8]) -> Result<(), ScrubError> {
        let Some(provider) = self.provider.as_mut() else {
            // No provider: pass through, keep no carry.
            self.sink.write_all(bytes)?;
            return Ok(());
        };
        let mut buf = Vec::with_capacity(self.carry.len() + bytes.len());
        buf.extend_from_slice(&self.carry);
        buf.extend_from_slice(bytes);
        let processed = match provider.handle_chunk(&buf) {
            Ok(p) => p,
            Err(e) => {
                // Fail closed: nothing written, raw bytes wiped.
                buf.zeroize();
                self.carry.zeroize();
                return Err(e);
            }
        };
        buf.zeroize();
        let max_len = provider.max_secret_length();
        let keep = if max_len == 0 { 0 } else { 3.max(max_len - 1) };
        let keep = keep.min(processed.len());
        let cut = processed.len() - keep;
        self.sink.write_all(&processed[..cut])?;
        self.carry.zeroize();
        self.carry.extend_from_slice(&processed[cut..]);
        Ok(())
    }

    fn flush_carry(&mut self) -> Result<(), ScrubError> {
        if self.carry.is_empty() {
            return Ok(());
        }
        let mut carry = std::mem::take(&mut self.carry);
        let result = match self.provider.as_mut() {
            // Already-processed bytes; one more pass is idempotent.
            Some(provider) => provider.handle_chunk(&carry),
            None => Ok(carry.clone()),
        };
        carry.zeroize();
        let out = result?;
        self.sink.write_all(&out)?;
        Ok(())
    }
}

pub struct StreamScrubber {
    state: Mutex<ScrubberState>,
}

impl StreamScrubber {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(ScrubberState {
                sink: Box::new(sink),
                provider: None,
                placeholder: None,
                carry: Vec::new(),
                frames: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Install the pattern source.
    pub fn with_secret_provider(self, provider: Box<dyn SecretProvider>) -> Self {
        self.lock().provider = Some(provider);
        self
    }

    /// Install a custom placeholder generator, consulted when secrets are
    /// registered as raw values.
    pub fn with_placeholder_func(self, f: PlaceholderFn) -> Self {
        self.lock().placeholder = Some(f);
        self
    }

    /// Register raw secret values: builds a variant-aware provider whose
    /// placeholders come from the configured placeholder function (or a
    /// fresh keyed generator).
    pub fn with_secret_values(self, values: Vec<Vec<u8>>) -> Self {
        {
            let mut st = self.lock();
            let placeholder = st
                .placeholder
                .take()
                .unwrap_or_else(|| Box::new(PlaceholderGenerator::new().as_fn()));
            let patterns: Vec<SecretPattern> = values
                .into_iter()
                .filter(|v| !v.is_empty())
                .map(|v| {
                    let p = placeholder(&v);
                    SecretPattern::new(v, p)
                })
                .collect();
            st.placeholder = Some(placeholder);
            st.provider = Some(Box::new(VariantProvider::from_patterns(patterns)));
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, ScrubberState> {
        self.state.lock().expect("scrubber mutex poisoned")
    }

    /// Write bytes through the filter: into the active frame when one is
    /// open, otherwise down the streaming path.
    pub fn write(&self, bytes: &[u8]) -> Result<(), ScrubError> {
        let mut st = self.lock();
        if st.closed {
            return Err(ScrubError::Closed);
        }
        if let Some(frame) = st.frames.last_mut() {
            frame.buf.extend_from_slice(bytes);
            return Ok(());
        }
        st.stream_write(bytes)
    }

    pub fn write_str(&self, s: &str) -> Result<(), ScrubError> {
        self.write(s.as_bytes())
    }

    /// Open a buffering frame. Writes accumulate until `end_frame`.
    pub fn start_frame(&self, label: impl Into<String>) -> Result<(), ScrubError> {
        let mut st = self.lock();
        if st.closed {
            return Err(ScrubError::Closed);
        }
        st.frames.push(Frame { label: label.into(), buf: Vec::new() });
        Ok(())
    }

    /// Close the innermost frame: run the provider once over its buffer
    /// and forward the sanitised output (to the parent frame, or down the
    /// streaming path). On provider error nothing is written and the
    /// buffer is zeroised.
    pub fn end_frame(&self) -> Result<(), ScrubError> {
        let mut st = self.lock();
        if st.closed {
            return Err(ScrubError::Closed);
        }
        let Some(mut frame) = st.frames.pop() else {
            return Err(ScrubError::NoActiveFrame);
        };
        let sanitized = match st.provider.as_mut() {
            Some(provider) => match provider.handle_chunk(&frame.buf) {
                Ok(out) => out,
                Err(e) => {
                    frame.buf.zeroize();
                    return Err(e);
                }
            },
            None => frame.buf.clone(),
        };
        frame.buf.zeroize();
        match st.frames.last_mut() {
            Some(parent) => {
                parent.buf.extend_from_slice(&sanitized);
                Ok(())
            }
            None => st.stream_write(&sanitized),
        }
    }

    /// Label of the innermost open frame, if any.
    pub fn current_frame(&self) -> Option<String> {
        self.lock().frames.last().map(|f| f.label.clone())
    }

    /// Force the residual carry through the provider and flush the sink.
    pub fn flush(&self) -> Result<(), ScrubError> {
        let mut st = self.lock();
        if st.closed {
            return Err(ScrubError::Closed);
        }
        st.flush_carry()?;
        st.sink.flush()?;
        Ok(())
    }

    /// Flush, then zeroise the carry and every open frame buffer. Open
    /// frames are discarded, never written: their contents were not
    /// sanitised. Idempotent.
    pub fn close(&self) -> Result<(), ScrubError> {
        {
            let st = self.lock();
            if st.closed {
                return Ok(());
            }
        }
        // flush() takes the lock itself; hold nothing across the call.
        let flushed = self.flush();
        let mut st = self.lock();
        st.carry.zeroize();
        for frame in &mut st.frames {
            frame.buf.zeroize();
        }
        st.frames.clear();
        st.closed = true;
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrub::provider::ReplacingProvider;
    use std::sync::{Arc, Mutex as StdMutex};

    /// Shared sink for asserting scrubbed output.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn scrubber_with(patterns: Vec<(&str, &str)>) -> (StreamScrubber, SharedBuf) {
        let sink = SharedBuf::default();
        let provider = ReplacingProvider::from_patterns(
            patterns
                .into_iter()
                .map(|(v, p)| SecretPattern::new(v.as_bytes().to_vec(), p.as_bytes().to_vec()))
                .collect(),
        );
        let scrubber =
            StreamScrubber::new(sink.clone()).with_secret_provider(Box::new(provider));
        (scrubber, sink)
    }

    /// A provider that always rejects, for fail-closed tests.
    struct RejectingProvider;

    impl SecretProvider for RejectingProvider {
        fn handle_chunk(&mut self, _input: &[u8]) -> Result<Vec<u8>, ScrubError> {
            Err(ScrubError::Provider("rejected".to_string()))
        }

        fn max_secret_length(&self) -> usize {
            8
        }
    }

    #[test]
    fn test_passthrough_without_provider() {
        let sink = SharedBuf::default();
        let scrubber = StreamScrubber::new(sink.clone());
        scrubber.write(b"plain bytes").unwrap();
        // No carry is kept: everything reaches the sink immediately.
        assert_eq!(sink.contents(), b"plain bytes".to_vec());
        scrubber.close().unwrap();
    }

    #[test]
    fn test_secret_in_single_write() {
        let (scrubber, sink) = scrubber_with(vec![("API_KEY_12345", "<P>")]);
        scrubber.write(b"The key is: API_KEY_12345\n").unwrap();
        scrubber.close().unwrap();
        assert_eq!(sink.contents(), b"The key is: <P>\n".to_vec());
    }

    // Scenario: secret split exactly as "The key is: API_" / "KEY_12345" / "\n".
    #[test]
    fn test_secret_split_across_writes() {
        let (scrubber, sink) = scrubber_with(vec![("API_KEY_12345", "<P>")]);
        scrubber.write(b"The key is: API_").unwrap();
        scrubber.write(b"KEY_12345").unwrap();
        scrubber.write(b"\n").unwrap();
        scrubber.close().unwrap();
        let out = sink.contents();
        assert_eq!(out, b"The key is: <P>\n".to_vec());
        let needle = b"API_KEY_12345";
        assert!(!out.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_chunking_never_changes_output() {
        let input = b"prefix SECRETVALUE middle SECRETVALUE suffix";
        let expected = {
            let (scrubber, sink) = scrubber_with(vec![("SECRETVALUE", "<X>")]);
            scrubber.write(input).unwrap();
            scrubber.close().unwrap();
            sink.contents()
        };
        // Split the input into every N-chunk partition for N in {2, 3, 4}.
        for pieces in 2..=4 {
            let step = input.len() / pieces + 1;
            let (scrubber, sink) = scrubber_with(vec![("SECRETVALUE", "<X>")]);
            for chunk in input.chunks(step) {
                scrubber.write(chunk).unwrap();
            }
            scrubber.close().unwrap();
            assert_eq!(sink.contents(), expected, "split into {} pieces", pieces);
        }
    }

    #[test]
    fn test_single_byte_writes() {
        let (scrubber, sink) = scrubber_with(vec![("SECRET", "<X>")]);
        for b in b"say SECRET twice SECRET done" {
            scrubber.write(&[*b]).unwrap();
        }
        scrubber.close().unwrap();
        assert_eq!(sink.contents(), b"say <X> twice <X> done".to_vec());
    }

    #[test]
    fn test_idempotent_on_scrubbed_output() {
        let (scrubber, sink) = scrubber_with(vec![("SECRET", "<X>")]);
        scrubber.write(b"a SECRET b").unwrap();
        scrubber.close().unwrap();
        let first = sink.contents();

        let (scrubber2, sink2) = scrubber_with(vec![("SECRET", "<X>")]);
        scrubber2.write(&first).unwrap();
        scrubber2.close().unwrap();
        assert_eq!(sink2.contents(), first);
    }

    #[test]
    fn test_frame_buffers_until_end() {
        let (scrubber, sink) = scrubber_with(vec![("SECRET", "<X>")]);
        scrubber.start_frame("section").unwrap();
        scrubber.write(b"inside SEC").unwrap();
        assert_eq!(sink.contents(), b"".to_vec());
        scrubber.write(b"RET frame").unwrap();
        assert_eq!(scrubber.current_frame().as_deref(), Some("section"));
        scrubber.end_frame().unwrap();
        scrubber.close().unwrap();
        assert_eq!(sink.contents(), b"inside <X> frame".to_vec());
    }

    #[test]
    fn test_nested_frames_forward_to_parent() {
        let (scrubber, sink) = scrubber_with(vec![("SECRET", "<X>")]);
        scrubber.start_frame("outer").unwrap();
        scrubber.write(b"a ").unwrap();
        scrubber.start_frame("inner").unwrap();
        scrubber.write(b"SECRET").unwrap();
        scrubber.end_frame().unwrap();
        scrubber.write(b" z").unwrap();
        scrubber.end_frame().unwrap();
        scrubber.close().unwrap();
        assert_eq!(sink.contents(), b"a <X> z".to_vec());
    }

    #[test]
    fn test_end_frame_without_frame_errors() {
        let (scrubber, _) = scrubber_with(vec![]);
        assert!(matches!(scrubber.end_frame(), Err(ScrubError::NoActiveFrame)));
    }

    #[test]
    fn test_frame_fails_closed_on_provider_error() {
        let sink = SharedBuf::default();
        let scrubber =
            StreamScrubber::new(sink.clone()).with_secret_provider(Box::new(RejectingProvider));
        scrubber.start_frame("f").unwrap();
        scrubber.write(b"sensitive").unwrap();
        assert!(matches!(scrubber.end_frame(), Err(ScrubError::Provider(_))));
        // Nothing reached the sink, and the scrubber stays usable.
        assert_eq!(sink.contents(), b"".to_vec());
        scrubber.start_frame("again").unwrap();
        scrubber.end_frame().unwrap();
    }

    #[test]
    fn test_stream_write_fails_closed_on_provider_error() {
        let sink = SharedBuf::default();
        let scrubber =
            StreamScrubber::new(sink.clone()).with_secret_provider(Box::new(RejectingProvider));
        assert!(matches!(scrubber.write(b"sensitive"), Err(ScrubError::Provider(_))));
        assert_eq!(sink.contents(), b"".to_vec());
        // Carry was wiped with the failure.
        assert_eq!(scrubber.state.lock().unwrap().carry.len(), 0);
    }

    #[test]
    fn test_close_zeroises_carry_and_frames() {
        let (scrubber, _) = scrubber_with(vec![("SECRETVALUE", "<X>")]);
        scrubber.write(b"tail bytes stay carried").unwrap();
        scrubber.start_frame("open").unwrap();
        scrubber.write(b"unsanitised and discarded").unwrap();
        scrubber.close().unwrap();
        let st = scrubber.state.lock().unwrap();
        assert_eq!(st.carry.len(), 0);
        assert!(st.frames.is_empty());
        assert!(st.closed);
    }

    #[test]
    fn test_open_frame_contents_never_written_on_close() {
        let (scrubber, sink) = scrubber_with(vec![("SECRET", "<X>")]);
        scrubber.start_frame("leaky").unwrap();
        scrubber.write(b"SECRET never flushed").unwrap();
        scrubber.close().unwrap();
        assert_eq!(sink.contents(), b"".to_vec());
    }

    #[test]
    fn test_close_is_idempotent_and_write_after_close_errors() {
        let (scrubber, _) = scrubber_with(vec![("S", "<X>")]);
        scrubber.close().unwrap();
        scrubber.close().unwrap();
        assert!(matches!(scrubber.write(b"x"), Err(ScrubError::Closed)));
        assert!(matches!(scrubber.flush(), Err(ScrubError::Closed)));
    }

    #[test]
    fn test_with_secret_values_uses_placeholder_func() {
        let sink = SharedBuf::default();
        let scrubber = StreamScrubber::new(sink.clone())
            .with_placeholder_func(Box::new(|_| b"[GONE]".to_vec()))
            .with_secret_values(vec![b"hunter2".to_vec()]);
        scrubber.write(b"pw is hunter2 ok").unwrap();
        scrubber.close().unwrap();
        assert_eq!(sink.contents(), b"pw is [GONE] ok".to_vec());
    }

    #[test]
    fn test_same_key_same_output_across_instances() {
        let run = || {
            let sink = SharedBuf::default();
            let gen = PlaceholderGenerator::with_key([9u8; 32]);
            let scrubber = StreamScrubber::new(sink.clone())
                .with_placeholder_func(Box::new(gen.as_fn()))
                .with_secret_values(vec![b"hunter2".to_vec()]);
            scrubber.write(b"pw hunter2 end").unwrap();
            scrubber.close().unwrap();
            sink.contents()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_concurrent_writers_serialise() {
        use std::thread;
        let (scrubber, sink) = scrubber_with(vec![("SECRET", "<X>")]);
        let scrubber = Arc::new(scrubber);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = scrubber.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    s.write(b"xSECRETx").unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        scrubber.close().unwrap();
        let out = sink.contents();
        let needle = b"SECRET";
        assert!(!out.windows(needle.len()).any(|w| w == needle));
        // 200 writes of "x<X>x".
        assert_eq!(out.len(), 200 * 5);
    }
}
