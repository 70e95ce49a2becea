//! Character classification helpers used by the expression lexer.

const SPACE: char = ' ';
const TAB: char = '\t';
const NEWLINE: char = '\n';
const RETURN: char = '\r';
const VTAB: char = '\x0B';
const FF: char = '\x0C';
const NBSP: char = '\u{00A0}';

const ZERO: char = '0';
const NINE: char = '9';
const LOWER_A: char = 'a';
const LOWER_Z: char = 'z';
const UPPER_A: char = 'A';
const UPPER_Z: char = 'Z';
const UNDERSCORE: char = '_';
const DOLLAR: char = '$';

/// Check if character is whitespace
pub fn is_whitespace(ch: char) -> bool {
    ch == SPACE
        || ch == TAB
        || ch == NEWLINE
        || ch == RETURN
        || ch == VTAB
        || ch == FF
        || ch <= ' '
        || ch == NBSP
}

/// Check if character is a digit
pub fn is_digit(ch: char) -> bool {
    ch >= ZERO && ch <= NINE
}

/// Check if character is ASCII letter
pub fn is_ascii_letter(ch: char) -> bool {
    (ch >= LOWER_A && ch <= LOWER_Z) || (ch >= UPPER_A && ch <= UPPER_Z)
}

/// Check if character can be part of an identifier
pub fn is_identifier_part(ch: char) -> bool {
    is_ascii_letter(ch) || ch == UNDERSCORE || ch == DOLLAR || is_digit(ch)
}
