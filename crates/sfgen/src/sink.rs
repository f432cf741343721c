use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::classify::Classification;
use crate::error::EngineError;
use crate::sequence::{Sequence, StatementRecord};

/// An output of the generation session.
#[derive(Debug, Clone)]
pub struct AcceptedSequence {
    /// Order of acceptance, from 0.
    pub index: u64,
    pub classification: Classification,
    pub sequence: Sequence,
}

/// Receives every output as it is accepted.
pub trait SequenceSink {
    fn accept(&mut self, accepted: &AcceptedSequence) -> Result<(), EngineError>;

    fn flush(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Keeps outputs in memory. Clones share the same storage, so a caller can
/// keep one handle and give another to the engine.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: Arc<Mutex<Vec<AcceptedSequence>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> Vec<AcceptedSequence> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Rendered code of every output, in acceptance order.
    pub fn codes(&self) -> Vec<String> {
        self.items.lock().iter().map(|a| a.sequence.to_code()).collect()
    }
}

impl SequenceSink for MemorySink {
    fn accept(&mut self, accepted: &AcceptedSequence) -> Result<(), EngineError> {
        self.items.lock().push(accepted.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct SinkLine<'a> {
    index: u64,
    classification: Classification,
    code: String,
    statements: &'a [StatementRecord],
}

/// Writes one JSON object per output line.
pub struct JsonLinesSink {
    out: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        let file = File::create(path)
            .map_err(|e| EngineError::Sink(format!("cannot create {}: {e}", path.display())))?;
        Ok(JsonLinesSink {
            out: BufWriter::new(file),
        })
    }
}

impl SequenceSink for JsonLinesSink {
    fn accept(&mut self, accepted: &AcceptedSequence) -> Result<(), EngineError> {
        let record = accepted.sequence.to_record();
        let line = SinkLine {
            index: accepted.index,
            classification: accepted.classification,
            code: accepted.sequence.to_code(),
            statements: &record.statements,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Forwards every output to each of its sinks in order.
pub struct TeeSink {
    sinks: Vec<Box<dyn SequenceSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Box<dyn SequenceSink>>) -> Self {
        TeeSink { sinks }
    }
}

impl SequenceSink for TeeSink {
    fn accept(&mut self, accepted: &AcceptedSequence) -> Result<(), EngineError> {
        for sink in &mut self.sinks {
            sink.accept(accepted)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod sink_tests {
    use super::*;
    use crate::demo::counter_catalog;

    #[test]
    fn test_tee_feeds_memory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let memory = MemorySink::new();
        let mut tee = TeeSink::new(vec![
            Box::new(memory.clone()),
            Box::new(JsonLinesSink::create(&path).unwrap()),
        ]);

        let new = counter_catalog().unwrap().get("Counter.new").unwrap();
        let accepted = AcceptedSequence {
            index: 0,
            classification: Classification::Regression,
            sequence: Sequence::empty().extend(new, &[]).unwrap(),
        };
        tee.accept(&accepted).unwrap();
        tee.flush().unwrap();

        assert_eq!(memory.codes(), vec!["Counter v0 = Counter();".to_string()]);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"classification\":\"regression\""));
    }
}
