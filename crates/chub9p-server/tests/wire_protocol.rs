//! Raw 9P transactions against a live listener.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ninep::protocol::{Format9p, Rdata, Rmessage, Tdata, Tmessage};

use chub9p_kernel::vfs::{QID_CHARACTERS, QID_ROOT};
use chub9p_kernel::{FetchResult, MemoryFetcher, ResourceFetcher};
use chub9p_server::constants::NOFID;
use chub9p_server::{wire, NinepServer, ServerConfig};
use chub9p_types::{Character, ResourceKind, ResourceRecord};

const SLOW_FETCH: Duration = Duration::from_secs(2);

/// Fixture records; fetching the id `slow` takes [`SLOW_FETCH`].
struct Fetcher {
    records: MemoryFetcher,
}

#[async_trait]
impl ResourceFetcher for Fetcher {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> FetchResult<ResourceRecord> {
        if id == "slow" {
            tokio::time::sleep(SLOW_FETCH).await;
        }
        self.records.fetch(kind, id).await
    }
}

async fn start() -> SocketAddr {
    let records = MemoryFetcher::new();
    records.insert(Character::new("abc123", "Aria"));
    records.insert(Character::new("slow", "Sloane"));
    records.insert(Character::new("fast", "Quick"));
    records.insert(Character::new("Ez", "Ezra"));
    records.insert(Character::new("FY", "Fyodor"));

    let config = ServerConfig {
        bind: "127.0.0.1".parse().unwrap(),
        port: 0,
        ..Default::default()
    };
    let server = NinepServer::new(config, Arc::new(Fetcher { records }));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    addr
}

/// Blocking client speaking one transaction at a time.
struct Wire {
    stream: TcpStream,
    tag: u16,
}

impl Wire {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut wire = Self { stream, tag: 0 };
        let reply = wire.rpc(Tdata::Version {
            msize: 65535,
            version: "9P2000".into(),
        });
        assert!(matches!(reply, Rdata::Version { version, .. } if version == "9P2000"));
        wire
    }

    fn attached(addr: SocketAddr) -> Self {
        let mut wire = Self::connect(addr);
        let reply = wire.rpc(attach(0, NOFID));
        assert!(matches!(reply, Rdata::Attach { aqid } if aqid.path == QID_ROOT));
        wire
    }

    fn rpc(&mut self, content: Tdata) -> Rdata {
        self.tag = self.tag.wrapping_add(1);
        let tag = self.tag;
        Tmessage { tag, content }.write_to(&mut self.stream).unwrap();
        let reply = Rmessage::read_from(&mut self.stream).unwrap();
        assert_eq!(reply.tag, tag);
        reply.content
    }

    fn walk(&mut self, fid: u32, new_fid: u32, path: &str) -> Rdata {
        self.rpc(Tdata::Walk {
            fid,
            new_fid,
            wnames: path.split('/').map(String::from).collect(),
        })
    }

    fn read_string(&mut self, fid: u32) -> String {
        match self.rpc(Tdata::Read {
            fid,
            offset: 0,
            count: 8192,
        }) {
            Rdata::Read { data } => String::from_utf8(wire::payload(&data).unwrap()).unwrap(),
            other => panic!("expected Rread, got {other:?}"),
        }
    }
}

fn attach(fid: u32, afid: u32) -> Tdata {
    Tdata::Attach {
        fid,
        afid,
        uname: "glenda".into(),
        aname: String::new(),
    }
}

fn error(ename: &str) -> Rdata {
    Rdata::Error {
        ename: ename.into(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_partial_walk() {
    let addr = start().await;
    tokio::task::spawn_blocking(move || {
        let mut wire = Wire::attached(addr);

        let Rdata::Walk { wqids } = wire.walk(0, 1, "characters/nobody/name") else {
            panic!("expected Rwalk");
        };
        assert_eq!(wqids.len(), 1);
        assert_eq!(wqids[0].path, QID_CHARACTERS);
        let Rdata::Stat { stat, .. } = wire.rpc(Tdata::Stat { fid: 1 }) else {
            panic!("expected Rstat");
        };
        assert_eq!(stat.name, "characters");

        // A failing first element binds nothing.
        assert_eq!(wire.walk(0, 2, "bogus"), error("file does not exist"));
        assert_eq!(wire.rpc(Tdata::Stat { fid: 2 }), error("unknown fid"));

        let Rdata::Walk { wqids } = wire.walk(0, 3, "characters/abc123/name") else {
            panic!("expected Rwalk");
        };
        assert_eq!(wqids.len(), 3);
        assert_eq!(wire.read_string(3), "Aria\n");
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_auth_refused() {
    let addr = start().await;
    tokio::task::spawn_blocking(move || {
        let mut wire = Wire::connect(addr);
        let auth = Tdata::Auth {
            afid: 5,
            uname: "glenda".into(),
            aname: String::new(),
        };
        assert_eq!(wire.rpc(auth), error("authentication not required"));
        assert_eq!(wire.rpc(attach(0, 5)), error("authentication not required"));

        assert!(matches!(wire.rpc(attach(0, NOFID)), Rdata::Attach { .. }));
        assert_eq!(wire.rpc(attach(0, NOFID)), error("fid already in use"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_colliding_qids_stay_separate() {
    let addr = start().await;
    tokio::task::spawn_blocking(move || {
        let mut wire = Wire::attached(addr);

        let (Rdata::Walk { wqids: ez }, Rdata::Walk { wqids: fy }) = (
            wire.walk(0, 1, "characters/Ez/name"),
            wire.walk(0, 2, "characters/FY/name"),
        ) else {
            panic!("expected Rwalk");
        };
        assert_eq!(ez[2].path, fy[2].path);

        assert_eq!(wire.read_string(1), "Ezra\n");
        assert_eq!(wire.read_string(2), "Fyodor\n");
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_fetch_does_not_block_other_clients() {
    let addr = start().await;

    let slow = tokio::task::spawn_blocking(move || {
        let mut wire = Wire::attached(addr);
        let reply = wire.walk(0, 1, "characters/slow/name");
        (reply, wire.read_string(1))
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let fast = tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let mut wire = Wire::attached(addr);
        assert!(matches!(wire.walk(0, 1, "characters/fast/name"), Rdata::Walk { .. }));
        let name = wire.read_string(1);
        (name, started.elapsed())
    })
    .await
    .unwrap();
    assert_eq!(fast.0, "Quick\n");
    assert!(fast.1 < SLOW_FETCH / 2, "fast client took {:?}", fast.1);

    let (reply, name) = slow.await.unwrap();
    assert!(matches!(reply, Rdata::Walk { wqids } if wqids.len() == 3));
    assert_eq!(name, "Sloane\n");
}
