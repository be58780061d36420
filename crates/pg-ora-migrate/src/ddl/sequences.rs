//! Standalone sequences.

use super::{DdlStatement, StatementKind};
use crate::source::{Sequence, SequenceOwnership};
use crate::typemap::IdentifierMode;
use tracing::debug;

/// CREATE SEQUENCE for every manual sequence.
///
/// Sequences owned by serial or identity columns are skipped; the identity
/// column replaces them.
pub(crate) fn sequence_statements(
    sequences: &[Sequence],
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> Vec<DdlStatement> {
    sequences
        .iter()
        .filter_map(|seq| {
            if let SequenceOwnership::Automatic { table, column } = &seq.ownership {
                debug!(
                    "Skipping sequence {} owned by {}.{}",
                    seq.name, table, column
                );
                return None;
            }
            Some(create_sequence(seq, mode, warnings))
        })
        .collect()
}

fn create_sequence(seq: &Sequence, mode: IdentifierMode, warnings: &mut Vec<String>) -> DdlStatement {
    let start = seq.next_value();
    let mut notes = Vec::new();
    if !seq.cycle && (start > seq.max_value || start < seq.min_value) {
        let note = format!(
            "next value {} is outside [{}, {}]; the sequence is exhausted",
            start, seq.min_value, seq.max_value
        );
        warnings.push(format!("{}: {}", seq.name, note));
        notes.push(note);
    }

    let cycle = if seq.cycle { "CYCLE" } else { "NOCYCLE" };
    DdlStatement {
        kind: StatementKind::Sequence,
        object: seq.name.clone(),
        sql: format!(
            "CREATE SEQUENCE {} START WITH {} INCREMENT BY {} MINVALUE {} MAXVALUE {} {}",
            mode.render(&seq.name),
            start,
            seq.increment,
            seq.min_value,
            seq.max_value,
            cycle
        ),
        notes,
    }
}
