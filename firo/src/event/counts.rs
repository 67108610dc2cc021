//! Event parameter blocks.
use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    Result,
    error::Error,
    firebird::{ProtocolError, consts::EPB_VERSION1},
};

const MAX_NAME_LENGTH: usize = 255;
const MAX_EPB_LENGTH: usize = 65535;

/// Cumulative counts of the events a subscription waits for.
///
/// Every queued block carries the counts seen so far plus one, the server
/// answers once any count moved past them.
#[derive(Debug, Clone)]
pub(crate) struct EventCounts {
    names: Vec<String>,
    counts: Vec<u32>,
}

impl EventCounts {
    pub(crate) fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::validation("at least one event is needed"));
        }
        if let Some(name) = names.iter().find(|name| name.len() > MAX_NAME_LENGTH) {
            return Err(Error::validation(format!(
                "event name `{name}` is longer than {MAX_NAME_LENGTH} bytes"
            )));
        }

        let me = Self { counts: vec![0; names.len()], names };
        if me.epb_len() > MAX_EPB_LENGTH {
            return Err(Error::validation(format!(
                "event buffer is larger than {MAX_EPB_LENGTH} bytes"
            )));
        }
        Ok(me)
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    fn epb_len(&self) -> usize {
        1 + self.names.iter().map(|name| name.len() + 5).sum::<usize>()
    }

    /// Event parameter block with the current counts.
    pub(crate) fn epb(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.epb_len());
        buf.put_u8(EPB_VERSION1);
        for (name, count) in self.names.iter().zip(&self.counts) {
            // length checked in `new`
            buf.put_u8(name.len() as u8);
            buf.put_slice(name.as_bytes());
            buf.put_u32_le(count.wrapping_add(1));
        }
        buf.freeze()
    }

    /// Take the counts of a notification, returning each event whose count
    /// moved with the difference to the previous counts.
    ///
    /// Names missing from `epb` keep their previous count.
    pub(crate) fn update(&mut self, epb: &[u8]) -> Result<Vec<(String, u32)>, ProtocolError> {
        let Some((_version, mut rest)) = epb.split_first() else {
            return Err(ProtocolError::malformed("empty event buffer"));
        };

        let mut current = self.counts.clone();
        while let Some((&len, tail)) = rest.split_first() {
            let len = len as usize;
            let (Some(name), Some(count)) = (tail.get(..len), tail.get(len..len + 4)) else {
                return Err(ProtocolError::malformed("truncated event buffer"));
            };
            let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]);
            if let Some(i) = self.names.iter().position(|n| n.as_bytes() == name) {
                current[i] = count.saturating_sub(1);
            }
            rest = &tail[len + 4..];
        }

        let deltas = self
            .names
            .iter()
            .zip(current.iter().zip(&self.counts))
            .filter_map(|(name, (now, prev))| match now.saturating_sub(*prev) {
                0 => None,
                delta => Some((name.clone(), delta)),
            })
            .collect();
        self.counts = current;
        Ok(deltas)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Event buffer as the server sends it, counts already incremented.
    pub(crate) fn server_epb(events: &[(&str, u32)]) -> Vec<u8> {
        let mut buf = vec![EPB_VERSION1];
        for (name, count) in events {
            buf.push(name.len() as u8);
            buf.extend(name.as_bytes());
            buf.extend(count.to_le_bytes());
        }
        buf
    }

    #[test]
    fn initial_block() {
        let counts = EventCounts::new(["a", "bc"]).unwrap();
        assert_eq!(&counts.epb()[..], &[1, 1, b'a', 1, 0, 0, 0, 2, b'b', b'c', 1, 0, 0, 0]);
    }

    #[test]
    fn validation() {
        assert!(EventCounts::new(Vec::<String>::new()).is_err());
        assert!(EventCounts::new(["x".repeat(256)]).is_err());
        assert!(EventCounts::new(["x".repeat(255)]).is_ok());
        let many: Vec<_> = (0..300).map(|i| format!("{i:0>255}")).collect();
        assert!(EventCounts::new(many).is_err());
    }

    #[test]
    fn three_posts_are_one_notification() {
        let mut counts = EventCounts::new(["created", "deleted"]).unwrap();

        let deltas = counts.update(&server_epb(&[("created", 4), ("deleted", 1)])).unwrap();
        assert_eq!(deltas, [("created".to_owned(), 3)]);
        // rearmed with the new counts
        assert_eq!(&counts.epb()[9..13], &4u32.to_le_bytes());

        // nothing posted since
        let deltas = counts.update(&server_epb(&[("created", 4), ("deleted", 1)])).unwrap();
        assert!(deltas.is_empty());

        let deltas = counts.update(&server_epb(&[("created", 5), ("deleted", 3)])).unwrap();
        assert_eq!(deltas, [("created".to_owned(), 1), ("deleted".to_owned(), 2)]);
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut counts = EventCounts::new(["a"]).unwrap();
        let deltas = counts.update(&server_epb(&[("b", 9), ("a", 2)])).unwrap();
        assert_eq!(deltas, [("a".to_owned(), 1)]);
    }

    #[test]
    fn truncated_buffer() {
        let mut counts = EventCounts::new(["abc"]).unwrap();
        let mut epb = server_epb(&[("abc", 2)]);
        epb.truncate(epb.len() - 1);
        assert!(counts.update(&epb).is_err());
        assert!(counts.update(&[]).is_err());
    }
}
