//! Terminal BAM writer for command pipelines.
//!
//! Commands end their pipeline in a [`ChannelSink`](lamprey_lib::pipeline::ChannelSink);
//! the functions here run the matching consumer, a dedicated thread that
//! drains the channel into a BAM writer and reports how many records it
//! wrote. The thread exits once every sender (that is, the last pipeline
//! node) has been dropped.

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Receiver;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;

use lamprey_lib::bam::{BamWriter, finish_bam_writer, read_to_record};
use lamprey_lib::messages::Message;

/// Capacity of the channel between the last pipeline node and the writer.
pub(crate) const WRITER_QUEUE_CAPACITY: usize = 1_000;

/// Spawns the writer thread draining `receiver` into `writer`.
pub(crate) fn spawn_writer(
    writer: BamWriter,
    header: Header,
    receiver: Receiver<Message>,
) -> JoinHandle<Result<u64>> {
    thread::spawn(move || write_messages(writer, &header, &receiver))
}

/// Joins the writer thread, surfacing panics as errors.
pub(crate) fn join_writer(handle: JoinHandle<Result<u64>>) -> Result<u64> {
    handle.join().map_err(|_| anyhow!("BAM writer thread panicked"))?
}

fn write_messages(
    mut writer: BamWriter,
    header: &Header,
    receiver: &Receiver<Message>,
) -> Result<u64> {
    let mut written = 0u64;
    for message in receiver {
        let record = match message {
            Message::Read(read) => read_to_record(&read),
            Message::Bam(record) => *record,
            Message::FlushPairingCache { .. } => continue,
            Message::Pair(pair) => {
                return Err(anyhow!(
                    "pair {}/{} reached the BAM writer; no stage consumed it",
                    pair.template.id,
                    pair.complement.id
                ));
            }
        };
        writer
            .write_alignment_record(header, &record)
            .context("Failed to write BAM record")?;
        written += 1;
    }
    finish_bam_writer(writer)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamprey_lib::bam::{create_bam_reader, create_bam_writer, record_name};
    use lamprey_lib::read::{PairOverlap, Read, ReadPair};
    use tempfile::TempDir;

    #[test]
    fn test_writer_drains_reads_and_records_and_skips_control() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bam");
        let header = Header::default();
        let writer = create_bam_writer(&path, &header, 1, 1).unwrap();

        let (sender, receiver) = crossbeam_channel::bounded(WRITER_QUEUE_CAPACITY);
        let handle = spawn_writer(writer, header.clone(), receiver);

        let read = Read::new("read-1", b"ACGT".to_vec(), vec![b'5'; 4]);
        let record = read_to_record(&Read::new("read-2", b"TTGA".to_vec(), vec![b'+'; 4]));
        sender.send(Message::from(read)).unwrap();
        sender.send(Message::FlushPairingCache { client_id: 0 }).unwrap();
        sender.send(Message::from(record)).unwrap();
        drop(sender);

        assert_eq!(join_writer(handle).unwrap(), 2);

        let (mut reader, header) = create_bam_reader(&path, 1).unwrap();
        let names: Vec<String> = reader
            .record_bufs(&header)
            .map(|result| record_name(&result.unwrap()))
            .collect();
        assert_eq!(names, vec!["read-1", "read-2"]);
    }

    #[test]
    fn test_writer_rejects_stray_pairs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bam");
        let header = Header::default();
        let writer = create_bam_writer(&path, &header, 1, 1).unwrap();

        let (sender, receiver) = crossbeam_channel::bounded(WRITER_QUEUE_CAPACITY);
        let handle = spawn_writer(writer, header, receiver);

        let template = Read::new("t", b"ACGT".to_vec(), vec![b'5'; 4]);
        let complement = Read::new("c", b"ACGT".to_vec(), vec![b'5'; 4]);
        let overlap = PairOverlap::full(4, 4);
        sender
            .send(Message::Pair(Box::new(ReadPair { template, complement, overlap })))
            .unwrap();
        drop(sender);

        let err = join_writer(handle).unwrap_err();
        assert!(err.to_string().contains("reached the BAM writer"));
    }
}
