use std::cell::RefCell;
use std::rc::Rc;

/// Map a word name to a label the assembler accepts.
pub fn canon(name: &str) -> String {
    name.replace('-', "_").replace('?', "_is_")
}

// Assembler rendering of a compile-time value: hex keeps the $ notation the
// source used for addresses, and MADS reads it back unchanged.
pub fn hex_literal(value: i32) -> String {
    let value = value as i64;
    if value < 0 {
        format!("-${:X}", -value)
    } else {
        format!("${:X}", value)
    }
}

/// A forward- or backward-patchable slot in a thread. The handle is shared
/// between the word's thread and the compile-time stack, so resolving it in
/// one place resolves it in the other.
pub struct BranchTarget {
    anchor_ip: usize,
    resolved: Option<String>,
}

pub type TargetRef = Rc<RefCell<BranchTarget>>;

impl BranchTarget {
    pub fn new(anchor_ip: usize) -> TargetRef {
        Rc::new(RefCell::new(BranchTarget {
            anchor_ip,
            resolved: None,
        }))
    }

    // Cells are two bytes on the target, so the relative form is twice the
    // cell distance from the anchor.
    pub fn update(&mut self, target_ip: usize) {
        let resolved = if target_ip >= self.anchor_ip {
            format!("*+{}", 2 * (target_ip - self.anchor_ip))
        } else {
            format!("*-{}", 2 * (self.anchor_ip - target_ip))
        };
        self.resolved = Some(resolved);
    }
}

pub enum ThreadCell {
    Ref(String),
    Target(TargetRef),
}

impl ThreadCell {
    fn render(&self) -> String {
        match self {
            ThreadCell::Ref(text) => text.clone(),
            ThreadCell::Target(target) => target
                .borrow()
                .resolved
                .clone()
                .expect("branch target rendered before resolution"),
        }
    }
}

pub struct RawCode {
    pub text: String,
    pub section: String,
}

pub struct Constant {
    pub name: String,
    pub label: String,
    pub value: i32,
    pub text_section: String,
    pub data_section: String,
    pub used: bool,
}

pub struct Variable {
    pub name: String,
    pub label: String,
    pub size_cells: usize,
    pub text_section: String,
    pub data_section: String,
    pub used: bool,
}

pub struct Word {
    pub name: String,
    pub label: String,
    pub section: String,
    pub thread: Vec<ThreadCell>,
    pub referenced_names: Vec<String>,
    pub inline_code: Option<String>,
    pub recursive: bool,
    pub used: bool,
}

impl Word {
    pub fn new(name: &str, section: &str) -> Self {
        Word {
            name: name.to_owned(),
            label: canon(name),
            section: section.to_owned(),
            thread: vec![ThreadCell::Ref("enter".to_owned())],
            referenced_names: vec![],
            inline_code: None,
            recursive: false,
            used: false,
        }
    }

    /// Next cell index, the compile-time instruction pointer.
    pub fn ip(&self) -> usize {
        self.thread.len()
    }

    pub fn append(&mut self, label: &str) {
        self.thread.push(ThreadCell::Ref(label.to_owned()));
    }

    // Appends an unresolved cell and returns the shared handle; the anchor
    // is the index just past the cell, which is what the runtime's branch
    // arithmetic expects.
    pub fn append_target(&mut self) -> TargetRef {
        let target = BranchTarget::new(self.ip() + 1);
        self.thread.push(ThreadCell::Target(target.clone()));
        target
    }

    pub fn append_resolved(&mut self, target_ip: usize) {
        let target = self.append_target();
        target.borrow_mut().update(target_ip);
    }
}

pub enum Item {
    RawCode(RawCode),
    Constant(Constant),
    Variable(Variable),
    Word(Word),
}

pub type ItemRef = Rc<RefCell<Item>>;

impl Item {
    /// The label other threads call this definition by.
    pub fn call_label(&self) -> String {
        match self {
            Item::RawCode(_) => String::new(),
            Item::Constant(c) => format!("const_{}", c.label),
            Item::Variable(v) => format!("var_{}", v.label),
            Item::Word(w) => w.label.clone(),
        }
    }

    pub fn mark_used(&mut self) {
        match self {
            Item::RawCode(_) => {}
            Item::Constant(c) => c.used = true,
            Item::Variable(v) => v.used = true,
            Item::Word(w) => w.used = true,
        }
    }

    pub fn is_used(&self) -> bool {
        match self {
            Item::RawCode(_) => true,
            Item::Constant(c) => c.used,
            Item::Variable(v) => v.used,
            Item::Word(w) => w.used,
        }
    }

    /// Render this item's contribution to one named section. Items that do
    /// not belong to the section, and dead definitions, render as empty.
    pub fn render(&self, section: &str) -> String {
        match self {
            Item::RawCode(raw) => {
                if raw.section == section {
                    let mut out = raw.text.clone();
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out
                } else {
                    String::new()
                }
            }
            Item::Constant(c) => {
                if !c.used {
                    String::new()
                } else if c.text_section == section {
                    format!("const_{}\n dta a(const),a({})\n", c.label, c.label)
                } else if c.data_section == section {
                    format!("{} equ {}\n", c.label, hex_literal(c.value))
                } else {
                    String::new()
                }
            }
            Item::Variable(v) => {
                if !v.used {
                    String::new()
                } else if v.text_section == section {
                    format!("var_{}\n dta a(const),a({})\n", v.label, v.label)
                } else if v.data_section == section {
                    let mut out = format!("{} equ *\n", v.label);
                    if v.size_cells > 0 {
                        out.push_str(&format!(" org *+{}\n", 2 * v.size_cells));
                    }
                    out
                } else {
                    String::new()
                }
            }
            Item::Word(w) => {
                if !w.used || w.section != section {
                    return String::new();
                }
                if let Some(body) = &w.inline_code {
                    let mut out = format!("{}\n dta a(*+2)\n{}", w.label, body);
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    return out;
                }
                let mut out = format!("{}\n", w.label);
                for cell in &w.thread {
                    out.push_str(&format!(" dta a({})\n", cell.render()));
                }
                out
            }
        }
    }
}

/// Render every item against each section in the given order. Sections are
/// introduced by a comment header and separated by a blank line.
pub fn render_all(items: &[ItemRef], sections: &[String]) -> String {
    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&format!("; section {}\n", section));
        for item in items {
            out.push_str(&item.borrow().render(section));
        }
    }
    out
}
