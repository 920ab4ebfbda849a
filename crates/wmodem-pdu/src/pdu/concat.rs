//! Multi-part message reassembly.
//!
//! Works on one listing batch at a time: fragments sharing a
//! `(sender, reference)` key are merged in sequence order, everything
//! else passes through unchanged. A sequence number stored twice counts
//! once; the copy at the lower storage index wins. Parts that arrive in a later listing
//! are not merged with parts from an earlier one.

use crate::pdu::types::{LogicalSms, SmsFragment};
use std::collections::HashMap;

/// Merge a batch of fragments into logical messages, ordered by the
/// storage index of each message's first-sequence part.
pub fn reassemble(fragments: Vec<SmsFragment>) -> Vec<LogicalSms> {
    let mut out = Vec::with_capacity(fragments.len());
    let mut groups: HashMap<(String, u16), Vec<SmsFragment>> = HashMap::new();

    for frag in fragments {
        if frag.error.is_none() && frag.concat.is_multipart() {
            groups
                .entry((frag.sender.clone(), frag.concat.reference))
                .or_default()
                .push(frag);
        } else {
            out.push(single(frag));
        }
    }

    for ((sender, reference), mut parts) in groups {
        parts.sort_by_key(|p| (p.concat.sequence, p.index));
        parts.dedup_by_key(|p| p.concat.sequence);
        let head = &parts[0];
        if parts.len() < head.concat.total as usize {
            log::debug!(
                "multi-part message from {} ref={} incomplete: {}/{} parts",
                sender,
                reference,
                parts.len(),
                head.concat.total
            );
        }
        out.push(LogicalSms {
            indices: parts.iter().map(|p| p.index).collect(),
            status: head.status,
            sender,
            timestamp: head.timestamp.clone(),
            text: parts.iter().map(|p| p.text.as_str()).collect(),
            reference: Some(reference),
            parts_expected: head.concat.total,
            parts_received: parts.len(),
            error: None,
        });
    }

    out.sort_by_key(LogicalSms::first_index);
    out
}

fn single(frag: SmsFragment) -> LogicalSms {
    LogicalSms {
        indices: vec![frag.index],
        status: frag.status,
        sender: frag.sender,
        timestamp: frag.timestamp,
        text: frag.text,
        reference: None,
        parts_expected: 1,
        parts_received: 1,
        error: frag.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::types::{ConcatInfo, SmsStatus};

    fn frag(index: u32, sender: &str, reference: u16, total: u8, seq: u8, text: &str) -> SmsFragment {
        SmsFragment {
            index,
            status: SmsStatus::ReceivedUnread,
            sender: sender.to_string(),
            timestamp: Some(format!("2024/01/01 00:00:0{}", seq)),
            text: text.to_string(),
            concat: ConcatInfo {
                reference,
                total,
                sequence: seq,
            },
            error: None,
        }
    }

    #[test]
    fn test_three_parts_any_order() {
        let batch = vec![
            frag(7, "+1555", 9, 3, 3, "C"),
            frag(5, "+1555", 9, 3, 1, "A"),
            frag(6, "+1555", 9, 3, 2, "B"),
        ];
        let out = reassemble(batch);
        assert_eq!(out.len(), 1);
        let m = &out[0];
        assert_eq!(m.text, "ABC");
        assert_eq!(m.indices, vec![5, 6, 7]);
        assert_eq!(m.timestamp.as_deref(), Some("2024/01/01 00:00:01"));
        assert_eq!(m.reference, Some(9));
        assert!(m.is_complete());
    }

    #[test]
    fn test_singles_pass_through_sorted_by_index() {
        let batch = vec![
            frag(4, "+1", 0, 1, 1, "four"),
            frag(2, "+2", 0, 1, 1, "two"),
        ];
        let out = reassemble(batch);
        assert_eq!(out.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["two", "four"]);
        assert!(out.iter().all(|m| m.reference.is_none()));
    }

    #[test]
    fn test_same_reference_different_senders_kept_apart() {
        let batch = vec![
            frag(1, "+1", 3, 2, 1, "a1"),
            frag(2, "+2", 3, 2, 1, "b1"),
            frag(3, "+1", 3, 2, 2, "a2"),
            frag(4, "+2", 3, 2, 2, "b2"),
        ];
        let out = reassemble(batch);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "a1a2");
        assert_eq!(out[0].indices, vec![1, 3]);
        assert_eq!(out[1].text, "b1b2");
    }

    #[test]
    fn test_order_follows_first_sequence_index() {
        let batch = vec![
            frag(9, "+1", 4, 2, 1, "A"),
            frag(1, "+1", 4, 2, 2, "B"),
            frag(5, "+2", 0, 1, 1, "single"),
        ];
        let out = reassemble(batch);
        assert_eq!(out.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["single", "AB"]);
        assert_eq!(out[1].indices, vec![9, 1]);
        assert_eq!(out[1].first_index(), 9);
    }

    #[test]
    fn test_duplicate_sequence_counts_once() {
        let batch = vec![
            frag(6, "+1", 2, 2, 1, "A"),
            frag(3, "+1", 2, 2, 1, "A"),
        ];
        let out = reassemble(batch);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "A");
        assert_eq!(out[0].indices, vec![3]);
        assert_eq!(out[0].parts_received, 1);
        assert!(!out[0].is_complete());
    }

    #[test]
    fn test_incomplete_group_still_emitted() {
        let out = reassemble(vec![frag(8, "+1", 5, 3, 2, "middle")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].parts_expected, 3);
        assert_eq!(out[0].parts_received, 1);
        assert!(!out[0].is_complete());
    }

    #[test]
    fn test_undecodable_passes_through() {
        let bad = SmsFragment::undecodable(3, SmsStatus::ReceivedRead, "00FF", "short pdu: pdu type");
        let out = reassemble(vec![bad, frag(1, "+1", 0, 1, 1, "ok")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].text, "00FF");
        assert_eq!(out[1].error.as_deref(), Some("short pdu: pdu type"));
    }
}
