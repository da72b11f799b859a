//! `MatchValueStreamWriter`: not an anomaly detector, a sidecar consumer
//! that copies decoded values at configured paths to an external byte
//! sink as they pass through dispatch.

use std::cell::RefCell;
use std::io::Write;

use crate::atom::LogAtom;
use crate::dispatch::AtomHandler;
use crate::event::EventBus;

pub struct MatchValueStreamWriter<W: Write> {
    target_path_list: Vec<String>,
    separator: String,
    sink: RefCell<W>,
}

impl<W: Write> MatchValueStreamWriter<W> {
    pub fn new(target_path_list: Vec<String>, separator: String, sink: W) -> Self {
        MatchValueStreamWriter { target_path_list, separator, sink: RefCell::new(sink) }
    }
}

impl<W: Write> AtomHandler for MatchValueStreamWriter<W> {
    fn receive_atom(&self, atom: &LogAtom, _bus: &EventBus) -> bool {
        let Some(tree) = atom.match_tree.as_ref() else { return false };
        let mut values = Vec::new();
        for path in &self.target_path_list {
            let Some(matched) = tree.get(path) else { return false };
            values.push(matched.first().value.display_string());
        }
        if values.is_empty() {
            return false;
        }
        let line = values.join(&self.separator);
        let mut sink = self.sink.borrow_mut();
        if let Err(err) = writeln!(sink, "{}", line) {
            tracing::error!(error = %err, "stream writer failed to write");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DecodedValue, MatchElement, MatchTree};

    fn atom_with_values(user: &str, host: &str) -> LogAtom {
        let user_el = MatchElement::new("root/user".to_string(), "user".to_string(), user.as_bytes().to_vec(), DecodedValue::Bytes(user.as_bytes().to_vec()));
        let host_el = MatchElement::new("root/host".to_string(), "host".to_string(), host.as_bytes().to_vec(), DecodedValue::Bytes(host.as_bytes().to_vec()));
        let root = MatchElement::new("root".to_string(), "root".to_string(), Vec::new(), DecodedValue::List(vec![user_el, host_el]));
        let tree = MatchTree::from_root(&root);
        LogAtom::new(b"line".to_vec(), Some(tree), "src", None)
    }

    #[test]
    fn writes_joined_values_per_atom() {
        let bus = EventBus::new(Vec::new());
        let buffer: Vec<u8> = Vec::new();
        let writer = MatchValueStreamWriter::new(vec!["root/user".to_string(), "root/host".to_string()], ",".to_string(), buffer);
        writer.receive_atom(&atom_with_values("alice", "host-a"), &bus);
        let output = String::from_utf8(writer.sink.borrow().clone()).unwrap();
        assert_eq!(output, "alice,host-a\n");
    }

    #[test]
    fn missing_path_is_not_handled() {
        let bus = EventBus::new(Vec::new());
        let buffer: Vec<u8> = Vec::new();
        let writer = MatchValueStreamWriter::new(vec!["root/missing".to_string()], ",".to_string(), buffer);
        assert!(!writer.receive_atom(&atom_with_values("alice", "host-a"), &bus));
    }
}
