mod compiler;
mod errors;
mod input;
mod items;
mod runtime;

pub use compiler::Compiler;
pub use errors::CompileError;
pub use input::{Input, Location};

/// Target-side knobs of a compilation: where the parameter stack lives, how
/// big it is, and the order the output sections appear in.
pub struct Options {
    pub pstack_bottom: String,
    pub pstack_size: u32,
    pub sections: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            pstack_bottom: "$600".to_owned(),
            pstack_size: 256,
            sections: ["init", "boot", "data", "text"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Compile one source text to the final assembly listing.
pub fn compile_source(
    file: &str,
    source: &str,
    options: &Options,
) -> Result<String, CompileError> {
    let mut compiler = Compiler::new(options)?;
    let mut input = Input::new(file, source);
    compiler.run(&mut input)?;
    compiler.finish(input.location())
}

/// Read a source file and compile it.
pub fn compile_file(path: &str, options: &Options) -> Result<String, CompileError> {
    let source = std::fs::read_to_string(path)
        .map_err(|_| CompileError::NoSuchFile(Location::new(path), path.to_owned()))?;
    compile_source(path, &source, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<String, CompileError> {
        compile_source("test.fth", source, &Options::default())
    }

    #[test]
    fn should_compile_constant_references() {
        let output = compile("$230 constant dladr  : main dladr ;").unwrap();
        assert!(output.contains("main\n dta a(enter)\n dta a(const_dladr)\n dta a(exit)\n"));
        assert!(output.contains("const_dladr\n dta a(const),a(dladr)\n"));
        assert!(output.contains("dladr equ $230\n"));
    }

    #[test]
    fn should_compile_branches() {
        let output = compile(": x 0= if 1 else 2 then ; : main x ;").unwrap();
        let expected = "x\n dta a(enter)\n dta a(zero_eq)\n dta a(_if)\n dta a(*+8)\n\
                        \x20dta a(lit)\n dta a(1)\n dta a(branch)\n dta a(*+4)\n\
                        \x20dta a(lit)\n dta a(2)\n dta a(exit)\n";
        assert!(output.contains(expected), "output was:\n{}", output);
    }

    #[test]
    fn should_compile_counted_loops() {
        let output = compile(": l 10 0 do i loop ; : main l ;").unwrap();
        let expected = "l\n dta a(enter)\n dta a(lit)\n dta a(10)\n dta a(lit)\n dta a(0)\n\
                        \x20dta a(do)\n dta a(i)\n dta a(loop)\n dta a(*-6)\n dta a(exit)\n";
        assert!(output.contains(expected), "output was:\n{}", output);
    }

    #[test]
    fn should_resolve_leave_past_the_back_branch() {
        let output = compile(": l 10 0 do i 5 = if leave then loop ; : main l ;").unwrap();
        // the queued leave lands on the cell after the loop's back branch
        let expected = "\x20dta a(unloop)\n dta a(branch)\n dta a(*+4)\n\
                        \x20dta a(loop)\n dta a(*-22)\n dta a(exit)\n";
        assert!(output.contains(expected), "output was:\n{}", output);
    }

    #[test]
    fn should_eliminate_dead_words() {
        let output = compile(": unused 1 ; : main 0 ;").unwrap();
        assert!(!output.contains("unused"));
        assert!(output.contains("main\n"));
    }

    #[test]
    fn should_report_leftover_stack_values() {
        let result = compile("1 2 : main ;");
        assert!(matches!(result, Err(CompileError::StackNotEmpty(_))));
    }

    #[test]
    fn should_report_unknown_words() {
        let result = compile(": main blit ;");
        match result {
            Err(CompileError::UnknownWord(location, text)) => {
                assert_eq!(text, "blit");
                assert_eq!(location.file, "test.fth");
                assert_eq!(location.line, 1);
                assert_eq!(location.column, 8);
            }
            other => panic!("expected UnknownWord, got {:?}", other.err()),
        }
    }

    #[test]
    fn should_report_missing_includes() {
        let result = compile("[include] \"no-such-file.fth\" : main ;");
        assert!(matches!(result, Err(CompileError::NoSuchFile(_, name)) if name == "no-such-file.fth"));
    }

    #[test]
    fn should_report_eof_inside_a_definition() {
        let result = compile(": main 1");
        assert!(matches!(
            result,
            Err(CompileError::UnexpectedEndOfStream(_))
        ));
    }

    #[test]
    fn should_reject_self_reference_without_recursive() {
        let result = compile(": w w ; : main w ;");
        assert!(matches!(result, Err(CompileError::UnknownWord(_, name)) if name == "w"));
    }

    #[test]
    fn should_allow_recursive_self_reference() {
        let output = compile(": w recursive dup if w then ; : main w ;").unwrap();
        assert!(output.contains("w\n dta a(enter)\n dta a(dup)\n dta a(_if)"));
        assert!(output.contains(" dta a(w)\n"));
    }

    #[test]
    fn should_fold_compile_time_arithmetic() {
        let output = compile("2 3 * 1 + constant seven  : main seven ;").unwrap();
        assert!(output.contains("seven equ $7\n"));
        // truncated integer division
        let output = compile("7 -2 / constant q  : main q ;").unwrap();
        assert!(output.contains("q equ -$3\n"));
    }

    #[test]
    fn should_scale_cells_at_compile_time() {
        let output = compile("3 cells constant six  : main six ;").unwrap();
        assert!(output.contains("six equ $6\n"));
    }

    #[test]
    fn should_emit_variables_and_data_words() {
        let output = compile("variable pos  2variable span  : main pos span ;").unwrap();
        assert!(output.contains("var_pos\n dta a(const),a(pos)\n"));
        assert!(output.contains("pos equ *\n org *+2\n"));
        assert!(output.contains("span equ *\n org *+4\n"));
    }

    #[test]
    fn should_emit_comma_data_in_the_data_section() {
        let output = compile("create table 1 , 2 , $ff c, 0 allot : main table ;").unwrap();
        assert!(output.contains("table equ *\n"));
        assert!(output.contains(" dta a(1)\n dta a(2)\n dta b(255)\n org *+0\n"));
    }

    #[test]
    fn should_emit_string_data() {
        let output = compile("create msg ,\" hi there\" : main msg ;").unwrap();
        assert!(output.contains(" dta 9,c' hi there'\n"));
        let output = compile("create msg 'score:'* : main msg ;").unwrap();
        assert!(output.contains(" dta d'score:'*\n"));
    }

    #[test]
    fn should_compile_while_loops() {
        let output = compile(": w begin dup while 1- repeat drop ; : main w ;").unwrap();
        let expected = "w\n dta a(enter)\n dta a(dup)\n dta a(while)\n dta a(*+6)\n\
                        \x20dta a(one_minus)\n dta a(branch)\n dta a(*-12)\n\
                        \x20dta a(drop)\n dta a(exit)\n";
        assert!(output.contains(expected), "output was:\n{}", output);
    }

    #[test]
    fn should_compile_until_loops() {
        let output = compile(": u begin 1- dup 0= until drop ; : main u ;").unwrap();
        let expected = "u\n dta a(enter)\n dta a(one_minus)\n dta a(dup)\n dta a(zero_eq)\n\
                        \x20dta a(until)\n dta a(*-10)\n dta a(drop)\n dta a(exit)\n";
        assert!(output.contains(expected), "output was:\n{}", output);
    }

    #[test]
    fn should_attach_inline_code_words() {
        let source = ": wait [code]\n lda #1\n sta $d40a\n jmp next\n[end-code] ; : main wait ;";
        let output = compile(source).unwrap();
        assert!(output.contains("wait\n dta a(*+2)\n lda #1\n sta $d40a\n jmp next\n"));
    }

    #[test]
    fn should_honor_label_declarations() {
        let output = compile(": go! [label] go 1 ; : main go! ;").unwrap();
        assert!(output.contains("go\n dta a(enter)\n dta a(lit)\n dta a(1)\n dta a(exit)\n"));
    }

    #[test]
    fn should_order_sections_as_requested() {
        let output = compile(": main 0 ;").unwrap();
        let init = output.find("; section init").unwrap();
        let boot = output.find("; section boot").unwrap();
        let data = output.find("; section data").unwrap();
        let text = output.find("; section text").unwrap();
        assert!(init < boot && boot < data && data < text);
        // the runtime lands in boot, compiled words in text
        assert!(output[boot..data].contains("jmp (tmp)"));
        assert!(output[text..].contains("main\n"));
    }

    #[test]
    fn should_rerender_identically() {
        let source = "variable v : tick v @ 1+ v ! ; : main tick tick ;";
        let first = compile(source).unwrap();
        let second = compile(source).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn should_shadow_redefined_words() {
        let output = compile(": f 1 ; : f 2 ; : main f ;").unwrap();
        assert!(output.contains("f\n dta a(enter)\n dta a(lit)\n dta a(2)\n dta a(exit)\n"));
        assert!(!output.contains("dta a(1)"));
    }

    #[test]
    fn should_substitute_stack_options() {
        let options = Options {
            pstack_bottom: "$9000".to_owned(),
            pstack_size: 128,
            ..Options::default()
        };
        let output = compile_source("test.fth", ": main 0 ;", &options).unwrap();
        assert!(output.contains("pstack equ $9000"));
        assert!(output.contains("ldx #128"));
    }

    #[test]
    fn should_skip_comments() {
        let output = compile("\\ a line comment\n( a token comment ) : main 0 ;").unwrap();
        assert!(output.contains("main\n"));
    }

    #[test]
    fn should_include_files() {
        let path = std::env::temp_dir().join("forth65_included.fth");
        std::fs::write(&path, "5 constant five\n").unwrap();
        let source = format!("[include] \"{}\" : main five ;", path.display());
        let output = compile(&source).unwrap();
        assert!(output.contains("five equ $5\n"));
    }
}
