//! One 9P client connection.
//!
//! Every connection owns its own [`Session`]. Requests are decoded in order
//! on the connection's reader; each fid operation then runs as its own task,
//! so a request stuck behind a remote fetch holds up neither later requests
//! on this connection nor any other connection. Replies funnel through a
//! single writer task.
//!
//! Tflush cancels the request it names: the task is aborted and never
//! replies. Closing the connection aborts whatever is still running and
//! drops the session, releasing every fid the client left bound.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable};
use ninep::protocol::{Data, Rdata, Rmessage, Tdata, Tmessage};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use chub9p_kernel::{Gateway, Session, VfsError, VfsResult};

use crate::constants::{IOHDRSZ, MAX_WELEM, MSIZE, NOFID, REPLY_QUEUE, VERSION_9P};
use crate::wire;

const E_NO_VERSION: &str = "first message must be Tversion";
const UNKNOWN_VERSION: &str = "unknown";

/// Open-mode bits (`OREAD`, `OWRITE`, `ORDWR`, `OEXEC`).
const OPEN_ACCESS: u8 = 0x03;
const OWRITE: u8 = 0x01;
const ORDWR: u8 = 0x02;

type Inflight = Arc<DashMap<u16, AbortHandle>>;

/// A client connection, ready to be served.
#[derive(Debug)]
pub struct Connection {
    gateway: Arc<Gateway>,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(gateway: Arc<Gateway>, peer: SocketAddr) -> Self {
        Self { gateway, peer }
    }

    /// Serve requests until the peer disconnects or sends garbage.
    pub async fn serve<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = self.peer;
        let (mut reader, writer) = tokio::io::split(stream);
        let (replies, queue) = mpsc::channel(REPLY_QUEUE);
        let writer = tokio::spawn(write_replies(writer, queue, peer));

        let inflight: Inflight = Arc::new(DashMap::new());
        let mut session = Arc::new(self.gateway.session());
        // Negotiated iounit; `None` until Tversion.
        let mut iounit: Option<u32> = None;

        tracing::info!(%peer, "9p connection opened");
        loop {
            let Tmessage { tag, content } = match wire::read_tmessage(&mut reader).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "dropping connection");
                    break;
                }
            };

            let content = match content {
                Tdata::Version { msize, version } => {
                    // A new version starts a fresh session.
                    abort_all(&inflight);
                    session = Arc::new(self.gateway.session());
                    let (reply, negotiated) = negotiate(msize, &version);
                    iounit = negotiated.map(|msize| msize - IOHDRSZ);
                    tracing::debug!(%peer, msize, %version, ?negotiated, "version");
                    reply
                }
                Tdata::Flush { old_tag } => {
                    if let Some((_, task)) = inflight.remove(&old_tag) {
                        task.abort();
                        tracing::debug!(%peer, old_tag, "flushed request");
                    }
                    Rdata::Flush {}
                }
                request => match iounit {
                    None => Rdata::Error {
                        ename: E_NO_VERSION.to_string(),
                    },
                    Some(iounit) => {
                        spawn_request(
                            &session,
                            &inflight,
                            &replies,
                            Tmessage {
                                tag,
                                content: request,
                            },
                            iounit,
                        );
                        continue;
                    }
                },
            };

            if replies.send(Rmessage { tag, content }).await.is_err() {
                break;
            }
        }

        abort_all(&inflight);
        drop(replies);
        drop(session);
        if let Err(e) = writer.await {
            tracing::debug!(%peer, error = %e, "reply writer ended abnormally");
        }
        tracing::info!(%peer, "9p connection closed");
    }
}

fn spawn_request(
    session: &Arc<Session>,
    inflight: &Inflight,
    replies: &mpsc::Sender<Rmessage>,
    request: Tmessage,
    iounit: u32,
) {
    let Tmessage { tag, content } = request;
    let (abort, registration) = AbortHandle::new_pair();
    inflight.insert(tag, abort);

    let session = session.clone();
    let inflight = inflight.clone();
    let replies = replies.clone();
    let task = async move {
        let content = dispatch(&session, content, iounit)
            .await
            .unwrap_or_else(|e| Rdata::Error { ename: rerror(e) });
        // Removed before replying: the client may reuse the tag once it
        // has the reply.
        inflight.remove(&tag);
        if replies.send(Rmessage { tag, content }).await.is_err() {
            tracing::debug!(tag, "connection closed before reply");
        }
    };
    tokio::spawn(Abortable::new(task, registration));
}

fn abort_all(inflight: &Inflight) {
    for task in inflight.iter() {
        task.value().abort();
    }
    inflight.clear();
}

async fn write_replies<W>(mut writer: W, mut queue: mpsc::Receiver<Rmessage>, peer: SocketAddr)
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = queue.recv().await {
        if let Err(e) = wire::write_rmessage(&mut writer, &reply).await {
            tracing::debug!(%peer, error = %e, "write failed");
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(%peer, error = %e, "shutdown failed");
    }
}

/// Rversion for a client's offer, and the msize to use if accepted.
///
/// `9P2000` and its dotted extensions (`9P2000.u`, `9P2000.L`) are answered
/// with plain `9P2000`.
fn negotiate(msize: u32, version: &str) -> (Rdata, Option<u32>) {
    let base = version.split('.').next().unwrap_or_default();
    if base != VERSION_9P || msize <= IOHDRSZ {
        return (
            Rdata::Version {
                msize: msize.min(MSIZE),
                version: UNKNOWN_VERSION.to_string(),
            },
            None,
        );
    }
    let msize = msize.min(MSIZE);
    (
        Rdata::Version {
            msize,
            version: VERSION_9P.to_string(),
        },
        Some(msize),
    )
}

/// Rerror string for a gateway error.
fn rerror(e: VfsError) -> String {
    tracing::debug!(error = %e, code = ?e.code(), "9p request failed");
    e.ename().to_string()
}

/// Run one fid request against `session`.
pub(crate) async fn dispatch(session: &Session, request: Tdata, iounit: u32) -> VfsResult<Rdata> {
    match request {
        Tdata::Auth { .. } => Err(VfsError::AuthNotRequired),

        Tdata::Attach {
            fid,
            afid,
            uname,
            aname,
        } => {
            if !aname.is_empty() {
                tracing::debug!(fid, %aname, "ignoring attach name");
            }
            let afid = (afid != NOFID).then_some(afid);
            let qid = session.attach(fid, afid, &uname)?;
            Ok(Rdata::Attach {
                aqid: wire::wire_qid(qid),
            })
        }

        Tdata::Walk {
            fid,
            new_fid,
            wnames,
        } => {
            if wnames.len() > MAX_WELEM {
                return Err(VfsError::io(format!("{} names in one walk", wnames.len())));
            }
            let qids = session.walk(fid, new_fid, &wnames).await?;
            Ok(Rdata::Walk {
                wqids: qids.into_iter().map(wire::wire_qid).collect(),
            })
        }

        Tdata::Open { fid, mode } => {
            let node = session.node(fid).await?;
            let access = mode & OPEN_ACCESS;
            if (access == OWRITE || access == ORDWR) && !node.is_writable() {
                return Err(VfsError::permission_denied(node.path()));
            }
            Ok(Rdata::Open {
                qid: wire::wire_qid(node.qid()),
                iounit,
            })
        }

        Tdata::Read { fid, offset, count } => {
            let count = count.min(iounit);
            let node = session.node(fid).await?;
            let data = if node.is_dir() {
                let entries = session.entries(fid).await?;
                wire::dir_chunk(&entries, offset, count)?
            } else {
                session.read(fid, offset, count).await?
            };
            Ok(Rdata::Read {
                data: Data::from(data),
            })
        }

        Tdata::Write { fid, offset, data } => {
            let data = wire::payload(&data).map_err(|e| VfsError::io(e.to_string()))?;
            let count = session.write(fid, offset, &data).await?;
            Ok(Rdata::Write {
                count: count as u32,
            })
        }

        Tdata::Clunk { fid } => {
            session.clunk(fid)?;
            Ok(Rdata::Clunk {})
        }

        Tdata::Stat { fid } => {
            let stat = wire::node_stat(&session.stat(fid).await?);
            // Rstat carries the stat's own size field again in front of it.
            let size = stat.size + 2;
            Ok(Rdata::Stat { size, stat })
        }

        // Remove clunks the fid whether or not the file goes away.
        Tdata::Remove { fid } => {
            let node = session.node(fid).await?;
            session.clunk(fid)?;
            Err(VfsError::permission_denied(node.path()))
        }

        Tdata::Create { fid, name, .. } => {
            let node = session.node(fid).await?;
            tracing::debug!(fid, parent = %node.path(), %name, "create refused");
            Err(VfsError::permission_denied(name))
        }

        Tdata::Wstat { fid, .. } => {
            let node = session.node(fid).await?;
            Err(VfsError::permission_denied(node.path()))
        }

        Tdata::Version { .. } | Tdata::Flush { .. } => {
            Err(VfsError::io("connection message in request path"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chub9p_kernel::vfs::{hash_path, QID_CHARACTERS, QID_ROOT};
    use chub9p_kernel::{GatewayConfig, MemoryFetcher};
    use chub9p_types::Character;
    use ninep::protocol::Format9p;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    const IOUNIT: u32 = MSIZE - IOHDRSZ;

    fn gateway() -> (Arc<MemoryFetcher>, Arc<Gateway>) {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(Character::new("abc123", "Aria"));
        fetcher.insert(Character::new("Ez", "Ezra"));
        fetcher.insert(Character::new("FY", "Fyodor"));
        let gateway = Arc::new(Gateway::new(fetcher.clone(), GatewayConfig::default()));
        (fetcher, gateway)
    }

    fn attached(gateway: &Arc<Gateway>) -> Session {
        let session = gateway.session();
        session.attach(0, None, "glenda").unwrap();
        session
    }

    async fn walk(session: &Session, fid: u32, newfid: u32, path: &str) -> VfsResult<Rdata> {
        let wnames = path.split('/').map(String::from).collect();
        dispatch(
            session,
            Tdata::Walk {
                fid,
                new_fid: newfid,
                wnames,
            },
            IOUNIT,
        )
        .await
    }

    async fn read(session: &Session, fid: u32, offset: u64) -> Vec<u8> {
        let reply = dispatch(
            session,
            Tdata::Read {
                fid,
                offset,
                count: IOUNIT,
            },
            IOUNIT,
        )
        .await
        .unwrap();
        match reply {
            // Data's buffer is private; go through its encoding.
            Rdata::Read { data } => wire::payload(&data).unwrap(),
            other => panic!("expected Rread, got {other:?}"),
        }
    }

    #[test]
    fn test_negotiate() {
        let (reply, msize) = negotiate(65535, "9P2000");
        assert_eq!(msize, Some(MSIZE));
        assert_eq!(
            reply,
            Rdata::Version {
                msize: MSIZE,
                version: "9P2000".into()
            }
        );

        assert_eq!(negotiate(4096, "9P2000.L").1, Some(4096));
        assert_eq!(negotiate(65535, "9P1").1, None);
        assert_eq!(negotiate(16, "9P2000").1, None);
    }

    #[tokio::test]
    async fn test_attach_refuses_auth_fid() {
        let (_, gw) = gateway();
        let session = gw.session();
        let attach = |fid, afid| Tdata::Attach {
            fid,
            afid,
            uname: "glenda".into(),
            aname: String::new(),
        };

        let err = dispatch(&session, attach(0, 7), IOUNIT).await.unwrap_err();
        assert!(matches!(err, VfsError::AuthNotRequired));
        assert_eq!(session.fid_count(), 0);

        let reply = dispatch(&session, attach(0, NOFID), IOUNIT).await.unwrap();
        assert!(matches!(reply, Rdata::Attach { aqid } if aqid.path == QID_ROOT));
    }

    #[tokio::test]
    async fn test_partial_walk_returns_prefix() {
        let (_, gw) = gateway();
        let session = attached(&gw);

        let reply = walk(&session, 0, 1, "characters/nobody/name").await.unwrap();
        let Rdata::Walk { wqids } = reply else {
            panic!("expected Rwalk");
        };
        assert_eq!(wqids.len(), 1);
        assert_eq!(wqids[0].path, QID_CHARACTERS);

        let err = walk(&session, 0, 2, "bogus").await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_walk_element_limit() {
        let (_, gw) = gateway();
        let session = attached(&gw);
        let path = vec!["characters"; MAX_WELEM + 1].join("/");
        assert!(matches!(walk(&session, 0, 1, &path).await, Err(VfsError::Io(_))));
    }

    #[tokio::test]
    async fn test_colliding_qids_read_their_own_files() {
        let (_, gw) = gateway();
        let session = attached(&gw);
        assert_eq!(
            hash_path("/characters/Ez/name"),
            hash_path("/characters/FY/name")
        );

        walk(&session, 0, 1, "characters/Ez/name").await.unwrap();
        walk(&session, 0, 2, "characters/FY/name").await.unwrap();
        assert_eq!(read(&session, 1, 0).await, b"Ezra\n");
        assert_eq!(read(&session, 2, 0).await, b"Fyodor\n");
    }

    #[tokio::test]
    async fn test_clunk_releases_fids() {
        let (_, gw) = gateway();
        let session = attached(&gw);

        for n in 0..500 {
            walk(&session, 0, 1, "characters/abc123/name").await.unwrap();
            assert_eq!(read(&session, 1, 0).await, b"Aria\n", "round {n}");
            dispatch(&session, Tdata::Clunk { fid: 1 }, IOUNIT).await.unwrap();
        }
        assert_eq!(session.fid_count(), 1);

        let err = dispatch(&session, Tdata::Clunk { fid: 1 }, IOUNIT).await.unwrap_err();
        assert!(matches!(err, VfsError::UnknownFid(1)));
    }

    #[tokio::test]
    async fn test_open_modes() {
        let (_, gw) = gateway();
        let session = attached(&gw);
        walk(&session, 0, 1, "characters/abc123/name").await.unwrap();
        walk(&session, 0, 2, "ctl").await.unwrap();

        let open = |fid, mode| Tdata::Open { fid, mode };
        let reply = dispatch(&session, open(1, 0), IOUNIT).await.unwrap();
        assert!(matches!(reply, Rdata::Open { iounit, .. } if iounit == IOUNIT));

        let err = dispatch(&session, open(1, OWRITE), IOUNIT).await.unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
        assert!(dispatch(&session, open(2, ORDWR), IOUNIT).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_and_stat() {
        let (_, gw) = gateway();
        let session = attached(&gw);
        walk(&session, 0, 1, "characters/abc123/name").await.unwrap();
        walk(&session, 0, 2, "ctl").await.unwrap();

        let write = |fid, bytes: &[u8]| Tdata::Write {
            fid,
            offset: 0,
            data: Data::from(bytes.to_vec()),
        };
        let err = dispatch(&session, write(1, b"x"), IOUNIT).await.unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));

        let reply = dispatch(&session, write(2, b"flush\n"), IOUNIT).await.unwrap();
        assert_eq!(reply, Rdata::Write { count: 6 });
        assert!(gw.cache().is_empty());

        let reply = dispatch(&session, Tdata::Stat { fid: 1 }, IOUNIT).await.unwrap();
        let Rdata::Stat { size, stat } = reply else {
            panic!("expected Rstat");
        };
        assert_eq!(stat.name, "name");
        assert_eq!(stat.length, 5);
        assert_eq!(size, stat.size + 2);
    }

    #[tokio::test]
    async fn test_remove_clunks_and_refuses() {
        let (_, gw) = gateway();
        let session = attached(&gw);
        walk(&session, 0, 1, "characters").await.unwrap();

        let err = dispatch(&session, Tdata::Remove { fid: 1 }, IOUNIT).await.unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
        assert_eq!(session.fid_count(), 1);
    }

    #[tokio::test]
    async fn test_directory_read_is_stat_records() {
        let (_, gw) = gateway();
        let session = attached(&gw);
        walk(&session, 0, 1, "characters/abc123").await.unwrap();

        let listing = read(&session, 1, 0).await;
        let stats: Vec<ninep::protocol::RawStat> = Data::from(listing).try_into().unwrap();
        let names: Vec<_> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names[..2], ["meta", "name"]);
        assert!(stats.iter().all(|s| s.length == 0));
    }

    // ========================================================================
    // Connection loop
    // ========================================================================

    async fn send(client: &mut DuplexStream, tag: u16, content: Tdata) {
        let mut buf = Vec::new();
        Tmessage { tag, content }.write_to(&mut buf).unwrap();
        client.write_all(&buf).await.unwrap();
    }

    async fn recv(client: &mut DuplexStream) -> Rmessage {
        let mut size = [0u8; 4];
        client.read_exact(&mut size).await.unwrap();
        let mut frame = vec![0u8; u32::from_le_bytes(size) as usize];
        frame[..4].copy_from_slice(&size);
        client.read_exact(&mut frame[4..]).await.unwrap();
        Rmessage::read_from(&mut Cursor::new(frame)).unwrap()
    }

    fn serve(gateway: Arc<Gateway>) -> (DuplexStream, tokio::task::JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = "127.0.0.1:5640".parse().unwrap();
        let task = tokio::spawn(Connection::new(gateway, peer).serve(server));
        (client, task)
    }

    #[tokio::test]
    async fn test_requests_need_version() {
        let (_, gw) = gateway();
        let (mut client, task) = serve(gw);

        send(&mut client, 1, Tdata::Clunk { fid: 0 }).await;
        let reply = recv(&mut client).await;
        assert_eq!(reply.tag, 1);
        assert_eq!(
            reply.content,
            Rdata::Error {
                ename: E_NO_VERSION.into()
            }
        );

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_cancels_pending_walk() {
        let (fetcher, gw) = gateway();
        fetcher.set_delay(Some(Duration::from_secs(30)));
        let (mut client, task) = serve(gw);

        let version = Tdata::Version {
            msize: 65535,
            version: "9P2000".into(),
        };
        send(&mut client, u16::MAX, version).await;
        assert!(matches!(recv(&mut client).await.content, Rdata::Version { .. }));
        let attach = Tdata::Attach {
            fid: 0,
            afid: NOFID,
            uname: "glenda".into(),
            aname: String::new(),
        };
        send(&mut client, 1, attach).await;
        assert!(matches!(recv(&mut client).await.content, Rdata::Attach { .. }));

        let slow = Tdata::Walk {
            fid: 0,
            new_fid: 1,
            wnames: vec!["characters".into(), "abc123".into()],
        };
        send(&mut client, 2, slow).await;
        send(&mut client, 3, Tdata::Flush { old_tag: 2 }).await;
        let reply = recv(&mut client).await;
        assert_eq!((reply.tag, reply.content), (3, Rdata::Flush {}));

        // The next reply belongs to the next request, not the flushed walk.
        send(&mut client, 4, Tdata::Clunk { fid: 0 }).await;
        let reply = recv(&mut client).await;
        assert_eq!((reply.tag, reply.content), (4, Rdata::Clunk {}));

        drop(client);
        task.await.unwrap();
    }
}
