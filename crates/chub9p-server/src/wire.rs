//! 9P framing over tokio streams.
//!
//! A message is `size[4] type[1] tag[2] body`. The frame is read into memory
//! first, then `ninep::protocol` decodes it, so a slow client never leaves a
//! half-decoded message holding the reader.

use std::io::{self, Cursor};
use std::time::SystemTime;

use ninep::fs::{FileMeta, Mode, Perm, Stat};
use ninep::protocol::{Data, Format9p, Qid as WireQid, RawStat, Rmessage, Tmessage};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use chub9p_kernel::vfs::QID_CTL;
use chub9p_kernel::{DirEntry, NodeStat, Qid, VfsError, VfsResult};

use crate::constants::{FILE_OWNER, MAX_FRAME};

/// `size[4] type[1] tag[2]`
const HEADER_LEN: usize = 7;

// ============================================================================
// Framing
// ============================================================================

/// Read one T-message. `Ok(None)` when the peer closed the stream.
pub async fn read_tmessage<R>(r: &mut R) -> io::Result<Option<Tmessage>>
where
    R: AsyncRead + Unpin,
{
    let mut size = [0u8; 4];
    match r.read_exact(&mut size).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(size) as usize;
    if !(HEADER_LEN..=MAX_FRAME).contains(&len) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {len} out of range"),
        ));
    }

    let mut frame = vec![0u8; len];
    frame[..4].copy_from_slice(&size);
    r.read_exact(&mut frame[4..]).await?;
    Tmessage::read_from(&mut Cursor::new(frame)).map(Some)
}

pub async fn write_rmessage<W>(w: &mut W, msg: &Rmessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(msg.n_bytes());
    msg.write_to(&mut buf)?;
    w.write_all(&buf).await?;
    w.flush().await
}

/// Bytes carried by a Twrite.
///
/// `Data` keeps its buffer private; its encoding is `count[4]` followed by
/// the bytes, so strip the count.
pub fn payload(data: &Data) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(data.n_bytes());
    data.write_to(&mut buf)?;
    Ok(buf.split_off(4))
}

// ============================================================================
// Qids and stats
// ============================================================================

pub fn wire_qid(qid: Qid) -> WireQid {
    let ty = if qid.is_dir() { Mode::DIR } else { Mode::FILE };
    WireQid {
        ty: ty.bits(),
        version: 0,
        path: qid.path,
    }
}

fn perms_for(qid: Qid) -> Perm {
    if qid.is_dir() {
        Perm::OWNER_READ | Perm::OWNER_EXEC
    } else if qid.path == QID_CTL {
        Perm::OWNER_READ | Perm::OWNER_WRITE
    } else {
        Perm::OWNER_READ
    }
}

pub fn raw_stat(name: &str, qid: Qid, length: u64) -> RawStat {
    let fm = if qid.is_dir() {
        FileMeta::dir(name, qid.path)
    } else {
        FileMeta::file(name, qid.path)
    };
    let now = SystemTime::now();
    Stat {
        fm,
        perms: perms_for(qid),
        n_bytes: length,
        last_accesses: now,
        last_modified: now,
        owner: FILE_OWNER.to_string(),
        group: FILE_OWNER.to_string(),
        last_modified_by: FILE_OWNER.to_string(),
    }
    .into()
}

pub fn node_stat(stat: &NodeStat) -> RawStat {
    raw_stat(&stat.name, stat.qid, stat.length)
}

/// One directory read: whole stat records starting at byte `offset` of the
/// listing, as many as fit in `count`.
///
/// Child sizes would need a fetch per child, so listings report 0.
pub fn dir_chunk(entries: &[DirEntry], offset: u64, count: u32) -> VfsResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut skip = offset;

    for entry in entries {
        let mut record = Vec::new();
        raw_stat(&entry.name, entry.qid, 0)
            .write_to(&mut record)
            .map_err(|e| VfsError::io(format!("encoding stat: {e}")))?;
        let len = record.len() as u64;

        if skip > 0 {
            if skip < len {
                return Err(VfsError::io("directory offset splits an entry"));
            }
            skip -= len;
            continue;
        }
        if out.len() + record.len() > count as usize {
            break;
        }
        out.extend(record);
    }
    Ok(out)
}
