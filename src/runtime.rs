// The two fixed assets every compilation starts from. Both are ordinary
// source for the front end: the runtime is one raw code block bound to the
// boot section, the base vocabulary is plain definitions in the text
// section, eliminated like user words when nothing reaches them.

/// The runtime with the stack parameters substituted in. The size is masked
/// to 8 bits; 256 becomes 0, which spans the whole page once the index
/// register wraps.
pub fn runtime_text(pstack_bottom: &str, pstack_size: u32) -> String {
    RUNTIME
        .replace("{pstack_bottom}", pstack_bottom)
        .replace("{pstack_size}", &(pstack_size & 0xff).to_string())
}

// Indirect threaded inner interpreter. ip points at the current thread cell
// and next pre-increments it, so every branch operand holds the address of
// its destination cell minus one cell; that is exactly the value the
// compiler's *+N / *-N arithmetic produces. The hardware stack carries
// return addresses and do-loop parameters; the parameter stack is an
// X-indexed page at pstack, empty at X = {pstack_size}.
const RUNTIME: &str = r#"
\ 6502 runtime
[text-section] boot
[code]
; zero page state of the inner interpreter
ip equ $a0
wreg equ $a2
tmp equ $a4
xsave equ $a6
acc equ $a8
sign equ $aa

pstack equ {pstack_bottom}

 org $2000

boot
 ldx #{pstack_size}
 lda #<[cold-2]
 sta ip
 lda #>[cold-2]
 sta ip+1
 jmp next

cold
 dta a(main)
 dta a(bye)

bye
 dta a(*+2)
stop
 jmp stop

; advance ip one cell, load the code field it names into w, then run the
; handler stored in that code field
next
 adw ip #2
 ldy #0
 lda (ip),y
 sta wreg
 iny
 lda (ip),y
 sta wreg+1
 ldy #0
 lda (wreg),y
 sta tmp
 iny
 lda (wreg),y
 sta tmp+1
 jmp (tmp)

; code field handler for colon words
enter
 lda ip+1
 pha
 lda ip
 pha
 lda wreg
 sta ip
 lda wreg+1
 sta ip+1
 jmp next

; code field handler for constants and variables: the cell after the code
; field goes to the stack as-is
const
 ldy #2
 lda (wreg),y
 sta tmp
 iny
 lda (wreg),y
 dex
 dex
 sta pstack+1,x
 lda tmp
 sta pstack,x
 jmp next

exit
 dta a(*+2)
 pla
 sta ip
 pla
 sta ip+1
 jmp next

lit
 dta a(*+2)
 adw ip #2
 ldy #0
 dex
 dex
 lda (ip),y
 sta pstack,x
 iny
 lda (ip),y
 sta pstack+1,x
 jmp next

branch
 dta a(*+2)
take
 ldy #2
 lda (ip),y
 sta tmp
 iny
 lda (ip),y
 sta ip+1
 lda tmp
 sta ip
 jmp next

; branch when the flag on the stack is zero; three entries, one body
_if
until
while
 dta a(*+2)
 inx
 inx
 lda pstack-2,x
 ora pstack-1,x
 beq take
 adw ip #2
 jmp next

; ( limit index -- ) move both loop parameters to the return stack
do
 dta a(*+2)
 lda pstack+3,x
 pha
 lda pstack+2,x
 pha
 lda pstack+1,x
 pha
 lda pstack,x
 pha
 inx
 inx
 inx
 inx
 jmp next

loop
 dta a(*+2)
 stx xsave
 tsx
 inc $101,x
 bne loop_test
 inc $102,x
loop_test
 lda $101,x
 cmp $103,x
 bne loop_back
 lda $102,x
 cmp $104,x
 bne loop_back
 ldx xsave
 pla
 pla
 pla
 pla
 adw ip #2
 jmp next
loop_back
 ldx xsave
 jmp take

; ( n -- ) add n to the index, stop once it crosses the limit
plus_loop
 dta a(*+2)
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 inx
 inx
 stx xsave
 tsx
 clc
 lda $101,x
 adc tmp
 sta $101,x
 lda $102,x
 adc tmp+1
 sta $102,x
 lda $101,x
 cmp $103,x
 lda $102,x
 sbc $104,x
 bcc plus_loop_back
 ldx xsave
 pla
 pla
 pla
 pla
 adw ip #2
 jmp next
plus_loop_back
 ldx xsave
 jmp take

unloop
 dta a(*+2)
 pla
 pla
 pla
 pla
 jmp next
[end-code]
"#;

// The base vocabulary. Code words first, colon words built on them after.
// Stack pictures follow the usual convention; top of stack is rightmost.
pub const BASE_WORDS: &str = r#"
\ core vocabulary
[text-section] text

( stack manipulation )

: dup
[code]
 dex
 dex
 lda pstack+2,x
 sta pstack,x
 lda pstack+3,x
 sta pstack+1,x
 jmp next
[end-code]
;

: drop
[code]
 inx
 inx
 jmp next
[end-code]
;

: swap
[code]
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 lda pstack+2,x
 sta pstack,x
 lda pstack+3,x
 sta pstack+1,x
 lda tmp
 sta pstack+2,x
 lda tmp+1
 sta pstack+3,x
 jmp next
[end-code]
;

: over
[code]
 dex
 dex
 lda pstack+4,x
 sta pstack,x
 lda pstack+5,x
 sta pstack+1,x
 jmp next
[end-code]
;

: rot ( a b c -- b c a )
[code]
 lda pstack+4,x
 sta tmp
 lda pstack+5,x
 sta tmp+1
 lda pstack+2,x
 sta pstack+4,x
 lda pstack+3,x
 sta pstack+5,x
 lda pstack,x
 sta pstack+2,x
 lda pstack+1,x
 sta pstack+3,x
 lda tmp
 sta pstack,x
 lda tmp+1
 sta pstack+1,x
 jmp next
[end-code]
;

( arithmetic )

: + [label] plus
[code]
 clc
 lda pstack,x
 adc pstack+2,x
 sta pstack+2,x
 lda pstack+1,x
 adc pstack+3,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

: - [label] minus
[code]
 sec
 lda pstack+2,x
 sbc pstack,x
 sta pstack+2,x
 lda pstack+3,x
 sbc pstack+1,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

: * [label] mult
[code]
 lda pstack+2,x
 sta tmp
 lda pstack+3,x
 sta tmp+1
 lda #0
 sta pstack+2,x
 sta pstack+3,x
 ldy #16
mult_bit
 lsr pstack+1,x
 ror pstack,x
 bcc mult_skip
 clc
 lda pstack+2,x
 adc tmp
 sta pstack+2,x
 lda pstack+3,x
 adc tmp+1
 sta pstack+3,x
mult_skip
 asl tmp
 rol tmp+1
 dey
 bne mult_bit
 inx
 inx
 jmp next
[end-code]
;

: / [label] divide
[code]
 lda #0
 sta sign
 lda pstack+3,x
 bpl divide_n_pos
 inc sign
 lda #0
 sec
 sbc pstack+2,x
 sta pstack+2,x
 lda #0
 sbc pstack+3,x
 sta pstack+3,x
divide_n_pos
 lda pstack+1,x
 bpl divide_d_pos
 inc sign
 lda #0
 sec
 sbc pstack,x
 sta pstack,x
 lda #0
 sbc pstack+1,x
 sta pstack+1,x
divide_d_pos
 lda #0
 sta acc
 sta acc+1
 ldy #16
divide_bit
 asl pstack+2,x
 rol pstack+3,x
 rol acc
 rol acc+1
 lda acc
 sec
 sbc pstack,x
 sta tmp
 lda acc+1
 sbc pstack+1,x
 bcc divide_next
 sta acc+1
 lda tmp
 sta acc
 inc pstack+2,x
divide_next
 dey
 bne divide_bit
 inx
 inx
 lda sign
 lsr @
 bcc divide_done
 lda #0
 sec
 sbc pstack,x
 sta pstack,x
 lda #0
 sbc pstack+1,x
 sta pstack+1,x
divide_done
 jmp next
[end-code]
;

: 1+ [label] one_plus
[code]
 inc pstack,x
 bne one_plus_done
 inc pstack+1,x
one_plus_done
 jmp next
[end-code]
;

: 1- [label] one_minus
[code]
 lda pstack,x
 bne one_minus_low
 dec pstack+1,x
one_minus_low
 dec pstack,x
 jmp next
[end-code]
;

: 2* [label] two_times
[code]
 asl pstack,x
 rol pstack+1,x
 jmp next
[end-code]
;

: 2/ [label] two_div
[code]
 lda pstack+1,x
 cmp #$80
 ror pstack+1,x
 ror pstack,x
 jmp next
[end-code]
;

( comparison, forth truth is all ones )

: = [label] eq
[code]
 lda pstack,x
 cmp pstack+2,x
 bne eq_no
 lda pstack+1,x
 cmp pstack+3,x
 bne eq_no
 lda #$ff
 bne eq_store
eq_no
 lda #0
eq_store
 sta pstack+2,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

: < [label] less
[code]
 lda pstack+2,x
 cmp pstack,x
 lda pstack+3,x
 sbc pstack+1,x
 bvc less_sign
 eor #$80
less_sign
 bmi less_yes
 lda #0
 beq less_store
less_yes
 lda #$ff
less_store
 sta pstack+2,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

: 0= [label] zero_eq
[code]
 lda pstack,x
 ora pstack+1,x
 beq zero_eq_yes
 lda #0
 beq zero_eq_store
zero_eq_yes
 lda #$ff
zero_eq_store
 sta pstack,x
 sta pstack+1,x
 jmp next
[end-code]
;

: 0< [label] zero_lt
[code]
 lda pstack+1,x
 bmi zero_lt_yes
 lda #0
 beq zero_lt_store
zero_lt_yes
 lda #$ff
zero_lt_store
 sta pstack,x
 sta pstack+1,x
 jmp next
[end-code]
;

( bit operations )

: and [label] bit_and
[code]
 lda pstack,x
 and pstack+2,x
 sta pstack+2,x
 lda pstack+1,x
 and pstack+3,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

: or [label] bit_or
[code]
 lda pstack,x
 ora pstack+2,x
 sta pstack+2,x
 lda pstack+1,x
 ora pstack+3,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

: xor [label] bit_xor
[code]
 lda pstack,x
 eor pstack+2,x
 sta pstack+2,x
 lda pstack+1,x
 eor pstack+3,x
 sta pstack+3,x
 inx
 inx
 jmp next
[end-code]
;

( memory )

: @ [label] fetch
[code]
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 ldy #0
 lda (tmp),y
 sta pstack,x
 iny
 lda (tmp),y
 sta pstack+1,x
 jmp next
[end-code]
;

: ! [label] store
[code]
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 ldy #0
 lda pstack+2,x
 sta (tmp),y
 iny
 lda pstack+3,x
 sta (tmp),y
 inx
 inx
 inx
 inx
 jmp next
[end-code]
;

: c@ [label] c_fetch
[code]
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 ldy #0
 lda (tmp),y
 sta pstack,x
 lda #0
 sta pstack+1,x
 jmp next
[end-code]
;

: c! [label] c_store
[code]
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 ldy #0
 lda pstack+2,x
 sta (tmp),y
 inx
 inx
 inx
 inx
 jmp next
[end-code]
;

: +! [label] plus_store
[code]
 lda pstack,x
 sta tmp
 lda pstack+1,x
 sta tmp+1
 ldy #0
 clc
 lda (tmp),y
 adc pstack+2,x
 sta (tmp),y
 iny
 lda (tmp),y
 adc pstack+3,x
 sta (tmp),y
 inx
 inx
 inx
 inx
 jmp next
[end-code]
;

( return stack and loop indices )

: >r [label] to_r
[code]
 lda pstack+1,x
 pha
 lda pstack,x
 pha
 inx
 inx
 jmp next
[end-code]
;

: r> [label] r_from
[code]
 dex
 dex
 pla
 sta pstack,x
 pla
 sta pstack+1,x
 jmp next
[end-code]
;

: i
[code]
 stx xsave
 tsx
 lda $101,x
 sta tmp
 lda $102,x
 sta tmp+1
 ldx xsave
 dex
 dex
 lda tmp
 sta pstack,x
 lda tmp+1
 sta pstack+1,x
 jmp next
[end-code]
;

: j
[code]
 stx xsave
 tsx
 lda $105,x
 sta tmp
 lda $106,x
 sta tmp+1
 ldx xsave
 dex
 dex
 lda tmp
 sta pstack,x
 lda tmp+1
 sta pstack+1,x
 jmp next
[end-code]
;

( words built from the primitives )

: <> [label] not_eq = 0= ;
: > [label] greater swap < ;
: negate 0 swap - ;
: abs dup 0< if negate then ;
: nip swap drop ;
: tuck swap over ;
: 2dup [label] two_dup over over ;
: 2drop [label] two_drop drop drop ;
: mod 2dup / * - ;
: min 2dup > if swap then drop ;
: max 2dup < if swap then drop ;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_substitute_stack_parameters() {
        let text = runtime_text("$600", 256);
        assert!(text.contains("pstack equ $600"));
        assert!(text.contains("ldx #0"));
        assert!(!text.contains("{pstack_bottom}"));
        assert!(!text.contains("{pstack_size}"));
    }

    #[test]
    fn should_mask_the_stack_size() {
        let text = runtime_text("$600", 300);
        // 300 & 0xff
        assert!(text.contains("ldx #44"));
    }
}
