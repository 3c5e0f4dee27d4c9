//! Namespace Resolution
//!
//! Depth-segmented namespace binding stack shared by the reader and the
//! writer. Bindings live in one flat list; `counts[d]` is the number of
//! bindings visible at depth `d`, so closing an element discards its whole
//! segment at once.

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// Namespace binding (prefix -> URI); the default namespace has prefix ""
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub prefix: String,
    pub uri: String,
}

/// Stack of namespace bindings indexed by element depth
#[derive(Debug, Clone)]
pub struct NamespaceStack {
    bindings: Vec<Binding>,
    counts: Vec<usize>,
}

impl NamespaceStack {
    /// Create an empty stack (nothing bound at depth 0)
    pub fn new() -> Self {
        NamespaceStack {
            bindings: Vec::with_capacity(16),
            counts: vec![0; 8],
        }
    }

    /// Drop every binding
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Number of bindings visible at `depth`
    #[inline]
    pub fn count(&self, depth: usize) -> usize {
        self.counts
            .get(depth)
            .copied()
            .unwrap_or(0)
            .min(self.bindings.len())
    }

    /// Set the visible-binding count of `depth`, growing the table as needed
    pub fn set_count(&mut self, depth: usize, count: usize) {
        if depth >= self.counts.len() {
            self.counts.resize(depth + 4, 0);
        }
        self.counts[depth] = count;
    }

    /// Enter depth `depth` (>= 1): it starts with its parent's bindings
    pub fn open_scope(&mut self, depth: usize) {
        let inherited = if depth == 0 { 0 } else { self.count(depth - 1) };
        self.set_count(depth, inherited);
    }

    /// Append a binding to the segment of `depth`
    pub fn push_at(&mut self, depth: usize, prefix: impl Into<String>, uri: impl Into<String>) {
        let n = self.count(depth);
        self.bindings.truncate(n);
        self.bindings.push(Binding {
            prefix: prefix.into(),
            uri: uri.into(),
        });
        self.set_count(depth, n + 1);
    }

    /// Resolve `prefix` ("" for the default namespace) as seen from `depth`.
    ///
    /// `xml` and `xmlns` always resolve to their fixed URIs.
    pub fn lookup(&self, prefix: &str, depth: usize) -> Option<&str> {
        match prefix {
            "xml" => return Some(ns::XML),
            "xmlns" => return Some(ns::XMLNS),
            _ => {}
        }
        self.bindings[..self.count(depth)]
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.as_str())
    }

    /// Binding at flat position `pos`
    pub fn binding(&self, pos: usize) -> Option<&Binding> {
        self.bindings.get(pos)
    }

    /// Bindings visible at `depth`, outermost first
    pub fn visible(&self, depth: usize) -> &[Binding] {
        &self.bindings[..self.count(depth)]
    }

    /// Bindings declared by the element at `depth` itself
    pub fn declared_at(&self, depth: usize) -> &[Binding] {
        let start = if depth == 0 { 0 } else { self.count(depth - 1) };
        let end = self.count(depth);
        &self.bindings[start.min(end)..end]
    }
}

impl Default for NamespaceStack {
    fn default() -> Self {
        Self::new()
    }
}
