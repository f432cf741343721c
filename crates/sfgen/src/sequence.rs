use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use seqforge_util::SharedList;

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::operation::{CallStyle, OpKind, OpRef, Operation};
use crate::types::TypeDesc;
use crate::value::Literal;

/// Base of the polynomial sequence fingerprint.
const FINGERPRINT_BASE: u64 = 0x0000_0100_0000_01b3;

/// One operation applied to earlier values of the same sequence.
///
/// Inputs are stored as distances back to the producing statement, so the
/// same statement is valid wherever the sequence it belongs to is embedded.
#[derive(Clone)]
pub struct Statement {
    op: OpRef,
    inputs: Vec<usize>,
    hash: u64,
}

impl Statement {
    fn new(op: OpRef, inputs: Vec<usize>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(op.id().as_bytes());
        for d in &inputs {
            hasher.update(b"|");
            hasher.update(d.to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Statement {
            op,
            inputs,
            hash: u64::from_le_bytes(bytes),
        }
    }

    pub fn op(&self) -> &OpRef {
        &self.op
    }

    /// Relative back-references, one per operation input.
    pub fn relative_inputs(&self) -> &[usize] {
        &self.inputs
    }

    pub fn output(&self) -> &TypeDesc {
        self.op.output()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.op.kind(), OpKind::Null)
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.inputs == other.inputs && *self.op == *other.op
    }
}

impl Eq for Statement {}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.op.id(), self.inputs)
    }
}

/// An immutable sequence of statements with a structural fingerprint.
///
/// Positions flagged inactive hold values that must not be reused, such as
/// a reference a call returned as null. The flags are not part of the
/// fingerprint or of equality.
#[derive(Clone, Default)]
pub struct Sequence {
    statements: SharedList<Statement>,
    fingerprint: u64,
    inactive: Arc<BTreeSet<usize>>,
}

impl Sequence {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single statement producing a constant.
    pub fn literal(value: Literal) -> Self {
        Self::single(Arc::new(Operation::literal(value)))
    }

    /// A single statement producing null of type `ty`.
    pub fn null_of(ty: &TypeDesc) -> Self {
        Self::single(Arc::new(Operation::null(ty)))
    }

    fn single(op: OpRef) -> Self {
        let stmt = Statement::new(op, Vec::new());
        Sequence {
            fingerprint: stmt.hash,
            statements: SharedList::singleton(stmt),
            inactive: Arc::default(),
        }
    }

    /// Rebuild a sequence around an existing statement list.
    ///
    /// The list must be self-contained: every input refers inside it.
    pub fn from_statements(statements: SharedList<Statement>) -> Self {
        let fingerprint = statements
            .iter()
            .fold(0u64, |fp, s| fp.wrapping_mul(FINGERPRINT_BASE).wrapping_add(s.hash));
        Sequence {
            statements,
            fingerprint,
            inactive: Arc::default(),
        }
    }

    /// Lay sequences end to end. Shares every part.
    pub fn concat(parts: &[Sequence]) -> Self {
        let mut fingerprint = 0u64;
        for part in parts {
            fingerprint = fingerprint
                .wrapping_mul(wrapping_pow(FINGERPRINT_BASE, part.len()))
                .wrapping_add(part.fingerprint);
        }
        Sequence {
            statements: SharedList::concat(parts.iter().map(|p| p.statements.clone())),
            fingerprint,
            inactive: Arc::default(),
        }
    }

    /// Append `op` applied to the values at absolute positions `inputs`.
    pub fn extend(&self, op: OpRef, inputs: &[usize]) -> Result<Sequence, EngineError> {
        if inputs.len() != op.arity() {
            return Err(EngineError::Arity {
                op: op.id().to_string(),
                expected: op.arity(),
                got: inputs.len(),
            });
        }
        let len = self.len();
        let mut relative = Vec::with_capacity(inputs.len());
        for &pos in inputs {
            if pos >= len {
                return Err(EngineError::InvalidSequence(format!(
                    "{} input refers to position {pos} of a {len}-statement sequence",
                    op.id()
                )));
            }
            relative.push(len - pos);
        }
        let stmt = Statement::new(op, relative);
        Ok(Sequence {
            fingerprint: self.fingerprint.wrapping_mul(FINGERPRINT_BASE).wrapping_add(stmt.hash),
            statements: self.statements.extend_by_one(stmt),
            inactive: Arc::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Flag `positions` as holding values that must not be reused.
    pub fn with_inactive(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        let len = self.len();
        let mut inactive = (*self.inactive).clone();
        inactive.extend(positions.into_iter().filter(|&p| p < len));
        self.inactive = Arc::new(inactive);
        self
    }

    pub fn is_active(&self, pos: usize) -> bool {
        pos < self.len() && !self.inactive.contains(&pos)
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn statements(&self) -> &SharedList<Statement> {
        &self.statements
    }

    pub fn statement(&self, i: usize) -> Option<&Statement> {
        self.statements.get(i)
    }

    pub fn last_statement(&self) -> Option<&Statement> {
        self.statements.last()
    }

    /// Absolute positions of the inputs of statement `i`.
    pub fn input_positions(&self, i: usize) -> Vec<usize> {
        match self.statement(i) {
            Some(stmt) => stmt.inputs.iter().map(|d| i - d).collect(),
            None => Vec::new(),
        }
    }

    /// Number of statements that call into the code under test.
    pub fn method_calls(&self) -> usize {
        self.statements.iter().filter(|s| s.op.is_call()).count()
    }

    /// Positions of the values the last statement consumed or produced,
    /// ascending and without repeats.
    pub fn last_statement_positions(&self) -> Vec<usize> {
        let Some(last) = self.len().checked_sub(1) else {
            return Vec::new();
        };
        let mut positions = self.input_positions(last);
        positions.push(last);
        positions.sort_unstable();
        positions.dedup();
        positions
    }

    /// Reference types this sequence is a useful producer of: the output of
    /// its last statement and the values that statement consumed.
    pub fn produced_types(&self) -> BTreeSet<TypeDesc> {
        let mut types = BTreeSet::new();
        for pos in self.last_statement_positions() {
            if !self.is_active(pos) {
                continue;
            }
            if let Some(stmt) = self.statement(pos) {
                if stmt.output().is_reference() && !stmt.is_null() {
                    types.insert(stmt.output().clone());
                }
            }
        }
        types
    }

    /// The single literal this sequence consists of, if that is what it is.
    pub fn as_literal(&self) -> Option<&Literal> {
        if self.len() != 1 {
            return None;
        }
        match self.statement(0)?.op.kind() {
            OpKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Readable listing, one statement per line.
    pub fn to_code(&self) -> String {
        let mut lines = Vec::with_capacity(self.len());
        for (i, stmt) in self.statements.iter().enumerate() {
            let args: Vec<String> = stmt.inputs.iter().map(|d| format!("v{}", i - d)).collect();
            let op = &stmt.op;
            let out = op.output();
            let lhs = if out.is_void() {
                String::new()
            } else {
                format!("{out} v{i} = ")
            };
            let line = match op.kind() {
                OpKind::Literal(lit) => format!("{lhs}{lit};"),
                OpKind::Null => format!("{lhs}null;"),
                OpKind::Call { style: CallStyle::Constructor, .. } | OpKind::Call { style: CallStyle::Function, .. } => {
                    format!("{lhs}{}({});", op.name(), args.join(", "))
                }
                OpKind::Call { style: CallStyle::Method, .. } => {
                    let (receiver, rest) = args.split_first().map_or(("v?", &[][..]), |(r, rest)| (r.as_str(), rest));
                    format!("{lhs}{receiver}.{}({});", op.name(), rest.join(", "))
                }
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    pub fn to_record(&self) -> SequenceRecord {
        let statements = self
            .statements
            .iter()
            .enumerate()
            .map(|(i, stmt)| match stmt.op.kind() {
                OpKind::Literal(lit) => StatementRecord::Literal { value: lit.clone() },
                OpKind::Null => StatementRecord::Null { ty: stmt.output().clone() },
                OpKind::Call { .. } => StatementRecord::Call {
                    op: stmt.op.id().to_string(),
                    inputs: stmt.inputs.iter().map(|d| i - d).collect(),
                },
            })
            .collect();
        SequenceRecord {
            statements,
            inactive: self.inactive.iter().copied().collect(),
        }
    }

    /// Rebuild from a record, resolving call operations in `catalog`.
    pub fn from_record(record: &SequenceRecord, catalog: &Catalog) -> Result<Sequence, EngineError> {
        let mut seq = Sequence::empty();
        for stmt in &record.statements {
            seq = match stmt {
                StatementRecord::Literal { value } => {
                    seq.extend(Arc::new(Operation::literal(value.clone())), &[])?
                }
                StatementRecord::Null { ty } => seq.extend(Arc::new(Operation::null(ty)), &[])?,
                StatementRecord::Call { op, inputs } => {
                    let op = catalog
                        .get(op)
                        .ok_or_else(|| EngineError::UnknownOperation(op.clone()))?;
                    seq.extend(op, inputs)?
                }
            };
        }
        Ok(seq.with_inactive(record.inactive.iter().copied()))
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.statements == other.statements
    }
}

impl Eq for Sequence {}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sequence[{:016x}] {:?}", self.fingerprint, self.statements)
    }
}

fn wrapping_pow(mut base: u64, mut exp: usize) -> u64 {
    let mut acc = 1u64;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    acc
}

/// Serialized form of a statement. Inputs are absolute positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementRecord {
    Call { op: String, inputs: Vec<usize> },
    Literal { value: Literal },
    Null { ty: TypeDesc },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub statements: Vec<StatementRecord>,
    /// Positions whose values must not be reused.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inactive: Vec<usize>,
}

impl SequenceRecord {
    /// Whether every literal survives a JSON round trip.
    pub fn is_portable(&self) -> bool {
        self.statements.iter().all(|s| match s {
            StatementRecord::Literal { value: Literal::Float(x) } => x.is_finite(),
            _ => true,
        })
    }
}
