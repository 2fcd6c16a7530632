use crate::errors::{CompileError, Result};
use crate::input::{Input, Location, Token};
use crate::items::{self, canon, Constant, Item, ItemRef, RawCode, TargetRef, Variable, Word};
use crate::runtime;
use crate::Options;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

// Values living on the compile-time operand stack: numbers, already-emitted
// labels or raw text, and open branch targets.
enum StackValue {
    Int(i32),
    Text(String),
    Target(TargetRef),
}

#[derive(PartialEq)]
enum State {
    Interpret,
    Compile,
}

// Anchored prefix match for a numeric literal: optional '-', then decimal
// digits or '$' and hex digits. Returns the matched prefix (what a thread
// cell emits) and the parsed value (what the operand stack holds).
fn number_prefix(text: &str) -> Option<(&str, i32)> {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let negative = unsigned.len() != text.len();
    let (digits, radix) = match unsigned.strip_prefix('$') {
        Some(rest) => (rest, 16),
        None => (unsigned, 10),
    };
    let span = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if span == 0 {
        return None;
    }
    let value = i64::from_str_radix(&digits[..span], radix).ok()?;
    let value = if negative { -value } else { value };
    let matched = text.len() - digits.len() + span;
    Some((&text[..matched], value as i32))
}

fn strip_terminator(text: &str, quote: char) -> Option<(&str, bool)> {
    if quote == '\'' {
        if let Some(stripped) = text.strip_suffix("'*") {
            return Some((stripped, true));
        }
    }
    text.strip_suffix(quote).map(|stripped| (stripped, false))
}

// Drop the line break right after [code] and any trailing blanks, keeping
// interior indentation intact (the assembler is column sensitive).
fn trim_code(slice: &str) -> String {
    let mut body = slice;
    if let Some(index) = body.find('\n') {
        if body[..index].trim().is_empty() {
            body = &body[index + 1..];
        }
    }
    body.trim_end().to_owned()
}

fn with_word<R>(item: &ItemRef, f: impl FnOnce(&mut Word) -> R) -> R {
    match &mut *item.borrow_mut() {
        Item::Word(word) => f(word),
        _ => unreachable!("the open definition is always a word"),
    }
}

// Named definitions in most-recent-first lookup order, plus the fixed alias
// table. Entries are shared with the item list, so marking one used here is
// visible to rendering.
struct Dictionary {
    entries: Vec<(String, ItemRef)>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Dictionary {
    fn new() -> Self {
        let mut aliases = HashMap::new();
        aliases.insert("cells", "2*");
        aliases.insert("cell", "2*");
        aliases.insert("not", "0=");
        Dictionary {
            entries: vec![],
            aliases,
        }
    }

    fn register(&mut self, item: ItemRef) {
        let name = match &*item.borrow() {
            Item::Constant(c) => c.name.clone(),
            Item::Variable(v) => v.name.clone(),
            Item::Word(w) => w.name.clone(),
            Item::RawCode(_) => return,
        };
        self.entries.push((name, item));
    }

    fn find(&self, name: &str) -> Option<ItemRef> {
        let name = self.aliases.get(name).copied().unwrap_or(name);
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| entry == name)
            .map(|(_, item)| item.clone())
    }
}

pub struct Compiler {
    dictionary: Dictionary,
    items: Vec<ItemRef>,
    stack: Vec<StackValue>,
    leave_stack: Vec<Vec<TargetRef>>,
    current: Option<ItemRef>,
    state: State,
    text_section: String,
    data_section: String,
    sections: Vec<String>,
    // words whose labels were pushed in interpret mode; extra mark roots
    extra_roots: Vec<String>,
}

impl Compiler {
    /// A compiler with the runtime and base vocabulary already parsed in,
    /// ready for the user program.
    pub fn new(options: &Options) -> Result<Self> {
        let mut compiler = Compiler {
            dictionary: Dictionary::new(),
            items: vec![],
            stack: vec![],
            leave_stack: vec![],
            current: None,
            state: State::Interpret,
            text_section: "text".to_owned(),
            data_section: "data".to_owned(),
            sections: options.sections.clone(),
            extra_roots: vec![],
        };
        let asset = runtime::runtime_text(&options.pstack_bottom, options.pstack_size);
        let mut input = Input::new("<runtime>", &asset);
        compiler.run(&mut input)?;
        let mut input = Input::new("<base>", runtime::BASE_WORDS);
        compiler.run(&mut input)?;
        Ok(compiler)
    }

    /// Feed one source through the state machine. Includes recurse here with
    /// their own cursor; the caller's cursor is untouched while they run.
    pub fn run(&mut self, input: &mut Input) -> Result<()> {
        while let Some(token) = self.next_token(input)? {
            match self.state {
                State::Interpret => self.interpret_token(input, token)?,
                State::Compile => self.compile_token(input, token)?,
            }
        }
        if self.state == State::Compile {
            return Err(CompileError::UnexpectedEndOfStream(input.location()));
        }
        Ok(())
    }

    /// Verify the operand stack drained, mark everything reachable from
    /// main, and render the sections in order.
    pub fn finish(&mut self, end: Location) -> Result<String> {
        if !self.stack.is_empty() {
            return Err(CompileError::StackNotEmpty(end));
        }
        self.mark_reachable(&end)?;
        Ok(items::render_all(&self.items, &self.sections))
    }

    // comment forms are handled here so both states see them the same way
    fn next_token(&mut self, input: &mut Input) -> Result<Option<Token>> {
        loop {
            let Some(token) = input.next_token() else {
                return Ok(None);
            };
            if token == "\\" {
                input.skip_line();
                continue;
            }
            if token == "(" {
                loop {
                    match input.next_token() {
                        Some(tok) if tok.text.ends_with(')') => break,
                        Some(_) => {}
                        None => {
                            return Err(CompileError::UnexpectedEndOfStream(input.location()))
                        }
                    }
                }
                continue;
            }
            return Ok(Some(token));
        }
    }

    fn expect_token(&mut self, input: &mut Input) -> Result<Token> {
        self.next_token(input)?
            .ok_or_else(|| CompileError::UnexpectedEndOfStream(input.location()))
    }

    fn interpret_token(&mut self, input: &mut Input, token: Token) -> Result<()> {
        match token.text.as_str() {
            ":" => {
                let name = self.expect_token(input)?;
                let word = Word::new(&name.text, &self.text_section);
                let item = Rc::new(RefCell::new(Item::Word(word)));
                self.items.push(item.clone());
                self.current = Some(item);
                self.state = State::Compile;
            }
            "[include]" => {
                let name = self.expect_token(input)?;
                let path = name.text.replace('"', "");
                let source = fs::read_to_string(&path).map_err(|_| {
                    CompileError::NoSuchFile(name.location.clone(), path.clone())
                })?;
                let mut nested = Input::new(&path, &source);
                self.run(&mut nested)?;
            }
            "[code]" => {
                let body = self.read_code_block(input)?;
                self.push_raw(body, self.text_section.clone());
            }
            "[text-section]" => {
                self.text_section = self.expect_token(input)?.text;
            }
            "[data-section]" => {
                self.data_section = self.expect_token(input)?.text;
            }
            "variable" => self.define_variable(input, 1)?,
            "2variable" => self.define_variable(input, 2)?,
            "create" => self.define_variable(input, 0)?,
            "constant" => {
                let value = self.pop_int(&token)?;
                let name = self.expect_token(input)?;
                let item = Rc::new(RefCell::new(Item::Constant(Constant {
                    name: name.text.clone(),
                    label: canon(&name.text),
                    value,
                    text_section: self.text_section.clone(),
                    data_section: self.data_section.clone(),
                    used: false,
                })));
                self.items.push(item.clone());
                self.dictionary.register(item);
            }
            "," => {
                let value = self.pop_text(&token)?;
                self.push_raw(format!(" dta a({})", value), self.data_section.clone());
            }
            "c," => {
                let value = self.pop_text(&token)?;
                self.push_raw(format!(" dta b({})", value), self.data_section.clone());
            }
            "allot" => {
                let size = self.pop_int(&token)?;
                self.push_raw(format!(" org *+{}", size), self.data_section.clone());
            }
            "+" | "-" | "*" | "/" => self.arithmetic(&token)?,
            "cells" => {
                let value = self.pop_int(&token)?;
                self.stack.push(StackValue::Int(value.wrapping_mul(2)));
            }
            "]" => {
                if self.current.is_none() {
                    return Err(CompileError::Parse(
                        "no definition to continue".to_owned(),
                        token.location,
                    ));
                }
                self.state = State::Compile;
            }
            text => {
                let string_form = if text.starts_with(",\"") {
                    Some((true, '"'))
                } else if text.starts_with('"') {
                    Some((false, '"'))
                } else if text.starts_with(",'") {
                    Some((true, '\''))
                } else if text.starts_with('\'') {
                    Some((false, '\''))
                } else {
                    None
                };
                if let Some((counted, quote)) = string_form {
                    return self.read_string_data(input, &token, counted, quote);
                }
                if let Some((_, value)) = number_prefix(text) {
                    self.stack.push(StackValue::Int(value));
                    return Ok(());
                }
                let Some(entry) = self.dictionary.find(text) else {
                    return Err(CompileError::UnknownWord(
                        token.location.clone(),
                        token.text.clone(),
                    ));
                };
                let value = {
                    let mut entry = entry.borrow_mut();
                    match &mut *entry {
                        Item::Constant(c) => {
                            c.used = true;
                            StackValue::Int(c.value)
                        }
                        Item::Variable(v) => {
                            v.used = true;
                            StackValue::Text(v.label.clone())
                        }
                        Item::Word(w) => {
                            self.extra_roots.push(w.name.clone());
                            StackValue::Text(w.label.clone())
                        }
                        Item::RawCode(_) => unreachable!("raw code is never registered"),
                    }
                };
                self.stack.push(value);
            }
        }
        Ok(())
    }

    fn compile_token(&mut self, input: &mut Input, token: Token) -> Result<()> {
        let item = self
            .current
            .clone()
            .expect("compile state without an open definition");
        match token.text.as_str() {
            ";" => {
                with_word(&item, |w| w.append("exit"));
                self.dictionary.register(item.clone());
                self.state = State::Interpret;
            }
            "recursive" => with_word(&item, |w| w.recursive = true),
            "[label]" => {
                let label = self.expect_token(input)?;
                with_word(&item, |w| w.label = label.text.clone());
            }
            "[code]" => {
                let body = self.read_code_block(input)?;
                with_word(&item, |w| w.inline_code = Some(body));
            }
            "begin" => {
                let ip = with_word(&item, |w| w.ip());
                self.stack.push(StackValue::Int(ip as i32));
            }
            "again" => {
                let ip = self.pop_ip(&token)?;
                with_word(&item, |w| {
                    w.append("branch");
                    w.append_resolved(ip);
                });
            }
            "until" => {
                let ip = self.pop_ip(&token)?;
                with_word(&item, |w| {
                    w.append("until");
                    w.append_resolved(ip);
                });
            }
            "if" => {
                let target = with_word(&item, |w| {
                    w.append("_if");
                    w.append_target()
                });
                self.stack.push(StackValue::Target(target));
            }
            "else" => {
                let taken = self.pop_target(&token)?;
                let fresh = with_word(&item, |w| {
                    w.append("branch");
                    let fresh = w.append_target();
                    taken.borrow_mut().update(w.ip());
                    fresh
                });
                self.stack.push(StackValue::Target(fresh));
            }
            "then" => {
                let target = self.pop_target(&token)?;
                with_word(&item, |w| target.borrow_mut().update(w.ip()));
            }
            "while" => {
                let target = with_word(&item, |w| {
                    w.append("while");
                    w.append_target()
                });
                self.stack.push(StackValue::Target(target));
            }
            "repeat" => {
                let exit_target = self.pop_target(&token)?;
                let begin = self.pop_ip(&token)?;
                with_word(&item, |w| {
                    w.append("branch");
                    w.append_resolved(begin);
                    exit_target.borrow_mut().update(w.ip());
                });
            }
            "[" => {
                self.state = State::Interpret;
            }
            "literal" => {
                let text = self.pop_text(&token)?;
                with_word(&item, |w| {
                    w.append("lit");
                    w.append(&text);
                });
            }
            "do" => {
                let ip = with_word(&item, |w| {
                    w.append("do");
                    w.ip()
                });
                self.stack.push(StackValue::Int(ip as i32));
                self.leave_stack.push(vec![]);
            }
            "loop" | "+loop" => {
                let op = if token == "loop" { "loop" } else { "plus_loop" };
                let do_ip = self.pop_ip(&token)?;
                let leaves = self.leave_stack.pop().ok_or_else(|| {
                    CompileError::StackUnderflow(token.location.clone(), token.text.clone())
                })?;
                with_word(&item, |w| {
                    w.append(op);
                    w.append_resolved(do_ip);
                    let here = w.ip();
                    for leave in leaves {
                        leave.borrow_mut().update(here);
                    }
                });
            }
            "leave" => {
                let target = with_word(&item, |w| {
                    w.append("unloop");
                    w.append("branch");
                    w.append_target()
                });
                self.leave_stack
                    .last_mut()
                    .ok_or_else(|| {
                        CompileError::StackUnderflow(token.location.clone(), token.text.clone())
                    })?
                    .push(target);
            }
            "lit" => {
                let payload = self.expect_token(input)?;
                with_word(&item, |w| {
                    w.append("lit");
                    w.append(&payload.text);
                });
            }
            "[']" => {
                let name = self.expect_token(input)?;
                let entry = self.dictionary.find(&name.text).ok_or_else(|| {
                    CompileError::UnknownWord(name.location.clone(), name.text.clone())
                })?;
                let label = entry.borrow().call_label();
                with_word(&item, |w| {
                    w.append("lit");
                    w.append(&label);
                    w.referenced_names.push(name.text.clone());
                });
            }
            text => {
                let self_call = with_word(&item, |w| w.recursive && w.name == text);
                if self_call {
                    with_word(&item, |w| {
                        let label = w.label.clone();
                        let name = w.name.clone();
                        w.append(&label);
                        w.referenced_names.push(name);
                    });
                } else if let Some(entry) = self.dictionary.find(text) {
                    let label = entry.borrow().call_label();
                    with_word(&item, |w| {
                        w.append(&label);
                        w.referenced_names.push(token.text.clone());
                    });
                } else if let Some((prefix, _)) = number_prefix(text) {
                    let prefix = prefix.to_owned();
                    with_word(&item, |w| {
                        w.append("lit");
                        w.append(&prefix);
                    });
                } else {
                    return Err(CompileError::UnknownWord(
                        token.location.clone(),
                        token.text.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn define_variable(&mut self, input: &mut Input, size_cells: usize) -> Result<()> {
        let name = self.expect_token(input)?;
        let item = Rc::new(RefCell::new(Item::Variable(Variable {
            name: name.text.clone(),
            label: canon(&name.text),
            size_cells,
            text_section: self.text_section.clone(),
            data_section: self.data_section.clone(),
            used: false,
        })));
        self.items.push(item.clone());
        self.dictionary.register(item);
        Ok(())
    }

    fn arithmetic(&mut self, token: &Token) -> Result<()> {
        let b = self.pop_int(token)?;
        let a = self.pop_int(token)?;
        let value = match token.text.as_str() {
            "+" => a.wrapping_add(b),
            "-" => a.wrapping_sub(b),
            "*" => a.wrapping_mul(b),
            _ => {
                if b == 0 {
                    return Err(CompileError::Parse(
                        "division by zero".to_owned(),
                        token.location.clone(),
                    ));
                }
                a.wrapping_div(b)
            }
        };
        self.stack.push(StackValue::Int(value));
        Ok(())
    }

    // Verbatim capture between [code] and [end-code].
    fn read_code_block(&mut self, input: &mut Input) -> Result<String> {
        input.mark();
        loop {
            match input.next_token() {
                Some(tok) if tok == "[end-code]" => {
                    let slice = input.marked(input.last_token_start());
                    return Ok(trim_code(&slice));
                }
                Some(_) => {}
                None => return Err(CompileError::UnexpectedEndOfStream(input.location())),
            }
        }
    }

    // The opening token carries the first span of the string; if it is not
    // already terminated, the rest is taken verbatim up to a token ending in
    // the quote (or quote-star for inverse video).
    fn read_string(
        &mut self,
        input: &mut Input,
        token: &Token,
        quote: char,
    ) -> Result<(String, bool)> {
        let start = token.text.find(quote).unwrap() + 1;
        let rest = &token.text[start..];
        if let Some((content, inverse)) = strip_terminator(rest, quote) {
            return Ok((content.to_owned(), inverse));
        }
        input.mark();
        loop {
            match input.next_token() {
                Some(tok)
                    if tok.text.ends_with(quote)
                        || (quote == '\'' && tok.text.ends_with("'*")) =>
                {
                    let slice = input.marked(input.offset());
                    let (content, inverse) = strip_terminator(&slice, quote)
                        .expect("terminator token without terminator");
                    return Ok((format!("{}{}", rest, content), inverse));
                }
                Some(_) => {}
                None => return Err(CompileError::UnexpectedEndOfStream(input.location())),
            }
        }
    }

    fn read_string_data(
        &mut self,
        input: &mut Input,
        token: &Token,
        counted: bool,
        quote: char,
    ) -> Result<()> {
        let (content, inverse) = self.read_string(input, token, quote)?;
        let kind = if quote == '"' { 'c' } else { 'd' };
        let escaped = content.replace('\'', "''");
        let inverse = if inverse { "*" } else { "" };
        let line = if counted {
            format!(" dta {},{}'{}'{}", content.len(), kind, escaped, inverse)
        } else {
            format!(" dta {}'{}'{}", kind, escaped, inverse)
        };
        self.push_raw(line, self.data_section.clone());
        Ok(())
    }

    fn push_raw(&mut self, text: String, section: String) {
        self.items
            .push(Rc::new(RefCell::new(Item::RawCode(RawCode {
                text,
                section,
            }))));
    }

    fn pop(&mut self, token: &Token) -> Result<StackValue> {
        self.stack.pop().ok_or_else(|| {
            CompileError::StackUnderflow(token.location.clone(), token.text.clone())
        })
    }

    fn pop_int(&mut self, token: &Token) -> Result<i32> {
        match self.pop(token)? {
            StackValue::Int(value) => Ok(value),
            _ => Err(CompileError::Parse(
                format!("`{}` expects a number", token.text),
                token.location.clone(),
            )),
        }
    }

    fn pop_text(&mut self, token: &Token) -> Result<String> {
        match self.pop(token)? {
            StackValue::Int(value) => Ok(value.to_string()),
            StackValue::Text(text) => Ok(text),
            StackValue::Target(_) => Err(CompileError::Parse(
                format!("`{}` inside an open control structure", token.text),
                token.location.clone(),
            )),
        }
    }

    fn pop_ip(&mut self, token: &Token) -> Result<usize> {
        match self.pop(token)? {
            StackValue::Int(value) => Ok(value as usize),
            _ => Err(CompileError::Parse(
                format!("`{}` without a matching loop start", token.text),
                token.location.clone(),
            )),
        }
    }

    fn pop_target(&mut self, token: &Token) -> Result<TargetRef> {
        match self.pop(token)? {
            StackValue::Target(target) => Ok(target),
            _ => Err(CompileError::Parse(
                format!("`{}` without a matching branch", token.text),
                token.location.clone(),
            )),
        }
    }

    // Worklist closure from main over referenced names; constants and
    // variables were pre-marked at their point of reference and carry no
    // references of their own.
    fn mark_reachable(&mut self, end: &Location) -> Result<()> {
        if self.dictionary.find("main").is_none() {
            return Err(CompileError::Parse(
                "word main is not defined".to_owned(),
                end.clone(),
            ));
        }
        let mut work = vec!["main".to_owned()];
        work.append(&mut self.extra_roots);
        while let Some(name) = work.pop() {
            let Some(entry) = self.dictionary.find(&name) else {
                continue;
            };
            let mut entry = entry.borrow_mut();
            if entry.is_used() {
                continue;
            }
            entry.mark_used();
            if let Item::Word(word) = &*entry {
                work.extend(word.referenced_names.iter().cloned());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_match_number_prefixes() {
        assert_eq!(number_prefix("$230"), Some(("$230", 0x230)));
        assert_eq!(number_prefix("-5"), Some(("-5", -5)));
        assert_eq!(number_prefix("-$10"), Some(("-$10", -16)));
        assert_eq!(number_prefix("12ab"), Some(("12", 12)));
        assert_eq!(number_prefix("-"), None);
        assert_eq!(number_prefix("$"), None);
        assert_eq!(number_prefix("dup"), None);
    }

    #[test]
    fn should_resolve_aliases_to_the_same_entry() {
        let compiler = Compiler::new(&Options::default()).unwrap();
        let cells = compiler.dictionary.find("cells").unwrap();
        let two_times = compiler.dictionary.find("2*").unwrap();
        assert!(Rc::ptr_eq(&cells, &two_times));
        let not = compiler.dictionary.find("not").unwrap();
        let zero_eq = compiler.dictionary.find("0=").unwrap();
        assert!(Rc::ptr_eq(&not, &zero_eq));
    }

    #[test]
    fn should_shadow_older_entries() {
        let mut dictionary = Dictionary::new();
        let old = Rc::new(RefCell::new(Item::Word(Word::new("f", "text"))));
        let new = Rc::new(RefCell::new(Item::Word(Word::new("f", "text"))));
        dictionary.register(old);
        dictionary.register(new.clone());
        assert!(Rc::ptr_eq(&dictionary.find("f").unwrap(), &new));
    }

    #[test]
    fn should_trim_code_blocks_but_keep_indentation() {
        let body = trim_code("\n lda #0\n sta $d40e\n ");
        assert_eq!(body, " lda #0\n sta $d40e");
        // code on the same line as the opener is kept
        assert_eq!(trim_code(" rts "), " rts");
    }
}
