use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT-EDIT BUFFER
// Accumulates span-indexed edits against the immutable original source and
// renders the rewritten text. Ranges are addressed in original coordinates
// throughout; a moved range keeps accepting edits at its original offsets.
// ═══════════════════════════════════════════════════════════════════════════════

struct Chunk {
    start: u32,
    end: u32,
    /// None renders the original slice; Some renders replacement text.
    content: Option<String>,
    /// Text attached to the start of the chunk; travels with it when moved.
    intro: String,
    /// Text attached to the end of the chunk; travels with it when moved.
    outro: String,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct EditBuffer<'s> {
    source: &'s str,
    chunks: Vec<Chunk>,
    head: usize,
    by_start: HashMap<u32, usize>,
    by_end: HashMap<u32, usize>,
    /// Inserts at offset 0 that must stay in front of everything, including
    /// ranges moved to the front.
    head_intro: String,
    edited: bool,
}

impl<'s> EditBuffer<'s> {
    pub fn new(source: &'s str) -> Self {
        let len = source.len() as u32;
        let chunks = vec![Chunk {
            start: 0,
            end: len,
            content: None,
            intro: String::new(),
            outro: String::new(),
            prev: None,
            next: None,
        }];
        let mut by_start = HashMap::new();
        let mut by_end = HashMap::new();
        by_start.insert(0, 0);
        by_end.insert(len, 0);
        Self {
            source,
            chunks,
            head: 0,
            by_start,
            by_end,
            head_intro: String::new(),
            edited: false,
        }
    }

    pub fn has_edits(&self) -> bool {
        self.edited
    }

    /// Replace `[start, end)` with `content`.
    pub fn overwrite(&mut self, start: u32, end: u32, content: &str) {
        assert!(start < end, "overwrite range is empty or reversed");
        self.edited = true;
        self.split(start);
        self.split(end);
        let mut idx = self.by_start[&start];
        let mut first = true;
        loop {
            let chunk = &mut self.chunks[idx];
            chunk.content = Some(if first {
                content.to_string()
            } else {
                String::new()
            });
            first = false;
            if chunk.end >= end {
                break;
            }
            idx = chunk.next.expect("overwrite ran past end of source");
        }
    }

    pub fn remove(&mut self, start: u32, end: u32) {
        self.overwrite(start, end, "");
    }

    /// Insert `text` at `pos`, attached to the content that precedes it.
    /// Stays put if the range starting at `pos` is moved away.
    pub fn insert_left(&mut self, pos: u32, text: &str) {
        self.edited = true;
        if pos == 0 {
            self.head_intro.push_str(text);
            return;
        }
        self.split(pos);
        let idx = self.by_end[&pos];
        self.chunks[idx].outro.push_str(text);
    }

    /// Insert `text` at `pos`, attached to the content that follows it.
    /// Travels with the range starting at `pos` if that range is moved.
    pub fn insert_right(&mut self, pos: u32, text: &str) {
        self.edited = true;
        if pos as usize == self.source.len() {
            let idx = self.by_end[&pos];
            self.chunks[idx].outro.push_str(text);
            return;
        }
        self.split(pos);
        let idx = self.by_start[&pos];
        let mut intro = text.to_string();
        intro.push_str(&self.chunks[idx].intro);
        self.chunks[idx].intro = intro;
    }

    /// Relocate `[start, end)` so it renders immediately before the content
    /// at `dest`. Edits already made inside the range, and edits made later
    /// at its original offsets, travel with it. Text right-inserted at `dest`
    /// stays in front of the moved content.
    pub fn move_range(&mut self, start: u32, end: u32, dest: u32) {
        assert!(
            dest <= start || dest >= end,
            "move destination lies inside the moved range"
        );
        self.edited = true;
        self.split(start);
        self.split(end);
        self.split(dest);

        let first = self.by_start[&start];
        let last = self.by_end[&end];

        // Detach [first..=last] from the list.
        let before = self.chunks[first].prev;
        let after = self.chunks[last].next;
        if let Some(b) = before {
            self.chunks[b].next = after;
        } else {
            self.head = after.expect("cannot move the entire buffer");
        }
        if let Some(a) = after {
            self.chunks[a].prev = before;
        }

        // Reattach before the chunk starting at dest (or at the tail).
        let anchor = self.by_start.get(&dest).copied();
        match anchor {
            Some(anchor) => {
                // The anchor's intro was inserted ahead of the content at
                // dest; the moved range lands behind it, not in front.
                let intro = std::mem::take(&mut self.chunks[anchor].intro);
                if !intro.is_empty() {
                    let own = std::mem::take(&mut self.chunks[first].intro);
                    let mut combined = intro;
                    combined.push_str(&own);
                    self.chunks[first].intro = combined;
                }
                let anchor_prev = self.chunks[anchor].prev;
                self.chunks[first].prev = anchor_prev;
                self.chunks[last].next = Some(anchor);
                self.chunks[anchor].prev = Some(last);
                match anchor_prev {
                    Some(p) => self.chunks[p].next = Some(first),
                    None => self.head = first,
                }
            }
            None => {
                // dest == source.len(): append at the tail.
                let mut tail = self.head;
                while let Some(next) = self.chunks[tail].next {
                    tail = next;
                }
                self.chunks[tail].next = Some(first);
                self.chunks[first].prev = Some(tail);
                self.chunks[last].next = None;
            }
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.source.len() + 128);
        out.push_str(&self.head_intro);
        let mut idx = Some(self.head);
        while let Some(i) = idx {
            let chunk = &self.chunks[i];
            out.push_str(&chunk.intro);
            match &chunk.content {
                Some(text) => out.push_str(text),
                None => out.push_str(&self.source[chunk.start as usize..chunk.end as usize]),
            }
            out.push_str(&chunk.outro);
            idx = chunk.next;
        }
        out
    }

    /// Ensure a chunk boundary at `pos`.
    fn split(&mut self, pos: u32) {
        if pos == 0 || self.by_start.contains_key(&pos) || self.by_end.contains_key(&pos) {
            return;
        }
        let idx = self
            .chunks
            .iter()
            .position(|c| c.start < pos && pos < c.end)
            .expect("split position outside the source");
        assert!(
            self.chunks[idx].content.is_none(),
            "two independent edits over the same range"
        );
        let old_end = self.chunks[idx].end;
        let old_next = self.chunks[idx].next;
        let outro = std::mem::take(&mut self.chunks[idx].outro);

        let new_idx = self.chunks.len();
        self.chunks.push(Chunk {
            start: pos,
            end: old_end,
            content: None,
            intro: String::new(),
            outro,
            prev: Some(idx),
            next: old_next,
        });
        self.chunks[idx].end = pos;
        self.chunks[idx].next = Some(new_idx);
        if let Some(n) = old_next {
            self.chunks[n].prev = Some(new_idx);
        }
        self.by_start.insert(pos, new_idx);
        self.by_end.insert(old_end, new_idx);
        self.by_end.insert(pos, idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_unchanged() {
        let buffer = EditBuffer::new("var x = 1;");
        assert_eq!(buffer.render(), "var x = 1;");
        assert!(!buffer.has_edits());
    }

    #[test]
    fn test_overwrite() {
        let mut buffer = EditBuffer::new("let x = 1;");
        buffer.overwrite(0, 3, "var");
        assert_eq!(buffer.render(), "var x = 1;");
    }

    #[test]
    fn test_overwrite_disjoint() {
        let mut buffer = EditBuffer::new("let x = 1; let y = 2;");
        buffer.overwrite(11, 14, "var");
        buffer.overwrite(0, 3, "var");
        assert_eq!(buffer.render(), "var x = 1; var y = 2;");
    }

    #[test]
    fn test_remove_and_insert() {
        let mut buffer = EditBuffer::new("abcdef");
        buffer.remove(2, 4);
        buffer.insert_left(6, "!");
        assert_eq!(buffer.render(), "abef!");
    }

    #[test]
    fn test_insert_left_order() {
        let mut buffer = EditBuffer::new("ab");
        buffer.insert_left(1, "1");
        buffer.insert_left(1, "2");
        assert_eq!(buffer.render(), "a12b");
    }

    #[test]
    fn test_insert_right_before_left_attachment() {
        let mut buffer = EditBuffer::new("ab");
        buffer.insert_left(1, "L");
        buffer.insert_right(1, "R");
        assert_eq!(buffer.render(), "aLRb");
    }

    #[test]
    fn test_move_range_to_front() {
        let mut buffer = EditBuffer::new("head body");
        buffer.move_range(5, 9, 0);
        assert_eq!(buffer.render(), "bodyhead ");
    }

    #[test]
    fn test_move_keeps_nested_edits() {
        let mut buffer = EditBuffer::new("for(x){let y;}");
        buffer.overwrite(7, 10, "var");
        buffer.move_range(6, 14, 0);
        buffer.insert_left(6, "call();");
        assert_eq!(buffer.render(), "{var y;}for(x)call();");
    }

    #[test]
    fn test_edit_after_move() {
        let mut buffer = EditBuffer::new("for(x){let y;}");
        buffer.move_range(6, 14, 0);
        buffer.overwrite(7, 10, "var");
        assert_eq!(buffer.render(), "{var y;}for(x)");
    }

    #[test]
    fn test_head_intro_stays_in_front_of_moved_range() {
        let mut buffer = EditBuffer::new("loop body");
        buffer.insert_left(0, "alias; ");
        buffer.move_range(5, 9, 0);
        assert_eq!(buffer.render(), "alias; bodyloop ");
    }

    #[test]
    fn test_intro_travels_with_move() {
        let mut buffer = EditBuffer::new("head{b}");
        buffer.insert_right(4, "var loop = function () ");
        buffer.insert_left(7, ";");
        buffer.move_range(4, 7, 0);
        assert_eq!(buffer.render(), "var loop = function () {b};head");
    }

    #[test]
    fn test_dest_intro_stays_in_front_of_moved_range() {
        let mut buffer = EditBuffer::new("head body");
        buffer.insert_right(0, "frame ");
        buffer.move_range(5, 9, 0);
        assert_eq!(buffer.render(), "frame bodyhead ");
    }

    #[test]
    #[should_panic(expected = "same range")]
    fn test_overlapping_edits_panic() {
        let mut buffer = EditBuffer::new("abcdef");
        buffer.overwrite(1, 5, "x");
        buffer.overwrite(2, 3, "y");
    }
}
