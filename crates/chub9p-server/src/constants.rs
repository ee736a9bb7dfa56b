//! Server configuration constants.
//!
//! Centralizes defaults for the listener, the remote API, and the cache.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Standard 9P port.
pub const DEFAULT_PORT: u16 = 564;

/// Listen on every interface unless configured otherwise.
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Pause after a failed accept before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Remote content API.
pub const DEFAULT_API_BASE: &str = "https://api.chub.ai";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "CHUB_API_KEY";

/// How long a fetched resource stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Upper bound on one remote fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum payload of one read or write.
pub const IOUNIT: u32 = 8192;

/// Bytes of Tread/Twrite header in front of the payload.
pub const IOHDRSZ: u32 = 24;

/// Largest `msize` offered in Rversion.
pub const MSIZE: u32 = IOUNIT + IOHDRSZ;

/// Frames above this size close the connection.
pub const MAX_FRAME: usize = 1 << 20;

/// Most names one Twalk may carry.
pub const MAX_WELEM: usize = 16;

/// "No fid" marker in Tattach's `afid`.
pub const NOFID: u32 = u32::MAX;

/// Protocol version spoken.
pub const VERSION_9P: &str = "9P2000";

/// Replies buffered per connection before request tasks wait on the writer.
pub const REPLY_QUEUE: usize = 64;

/// Owner reported in stats.
pub const FILE_OWNER: &str = "chub";
