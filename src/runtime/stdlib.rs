//! Externs every program may rely on: `print`, `printInt`, and `random`.

use super::calls::{get_int, ret_int};
use super::runtime_error::VmError;
use super::vm::VmBuilder;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_SEED: u64 = 0x5EED_5EED;

/// SplitMix64 generator backing `random`.
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        SplitMix64 { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    pub fn next_i32(&mut self) -> i32 {
        (self.next_u64() >> 32) as u32 as i32
    }
}

/// Cloneable in-memory sink, handy for capturing program output.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit<W: Write>(out: &Mutex<W>, name: &str, bytes: &[u8]) -> Result<(), VmError> {
    let mut out = lock(out);
    out.write_all(bytes)
        .and_then(|()| out.flush())
        .map_err(|e| VmError::extern_failure(name, e.to_string()))
}

impl VmBuilder {
    /// Install the standard library writing to `out`, with the default seed.
    pub fn std_lib<W: Write + Send + 'static>(self, out: W) -> Self {
        self.std_lib_seeded(out, DEFAULT_SEED)
    }

    pub fn std_lib_seeded<W: Write + Send + 'static>(self, out: W, seed: u64) -> Self {
        let out = Arc::new(Mutex::new(out));
        let chars = Arc::clone(&out);
        let rng = Mutex::new(SplitMix64::new(seed));

        self.extern_call(
            "print",
            get_int(move |c| emit(&chars, "print", &[c as u8])),
        )
        .extern_call(
            "printInt",
            get_int(move |v| emit(&out, "printInt", v.to_string().as_bytes())),
        )
        .extern_call("random", ret_int(move || lock(&rng).next_i32()))
    }
}
