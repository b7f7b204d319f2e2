use serde::Serialize;

/// Which of the two long-range paths a frame goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Path {
    Mesh,
    WideArea,
}

/// Everything the engine knows about the physical radios.
///
/// Every call is attempt-and-return: `try_transmit` returns false when the
/// link is busy (or, for the wide-area path, not joined) and the engine
/// never retries; `poll_receive` hands back at most one raw mesh frame.
pub trait Radio {
    fn try_transmit(&mut self, path: Path, frame: &[u8]) -> bool;
    fn poll_receive(&mut self) -> Option<Vec<u8>>;
    fn is_wide_area_joined(&self) -> bool;
}
