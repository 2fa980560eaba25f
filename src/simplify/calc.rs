//! Bounded constant folding over the token stream.
//!
//! Template arguments are value-sensitive (`Array<N+1>` must canonicalize
//! before mangling), so the instantiation loop re-runs this pass whenever
//! new use sites appear. Folding is integral-only and deliberately
//! conservative: a fold is only performed when the operators on both sides
//! of the expression make it legal under C precedence.

use crate::errors::SimplifyError;
use crate::mathlib;
use crate::tokens::{TokenId, TokenList};

// Precedence ladder: is the neighboring token of lower precedence than the
// operator family being folded? Each level widens the previous one.

fn lower_than_or(list: &TokenList, tok: TokenId) -> bool {
    list.is_assignment_op(tok)
        || list.matches(
            Some(tok),
            "}|;|(|[|]|)|,|?|:|%oror%|&&|return|throw|case",
        )
}

fn lower_than_xor(list: &TokenList, tok: TokenId) -> bool {
    lower_than_or(list, tok) || list.text(tok) == "|"
}

fn lower_than_and(list: &TokenList, tok: TokenId) -> bool {
    lower_than_xor(list, tok) || list.text(tok) == "^"
}

fn lower_than_shift(list: &TokenList, tok: TokenId) -> bool {
    lower_than_and(list, tok) || list.matches(Some(tok), "%cop%|&")
}

fn lower_than_plus_minus(list: &TokenList, tok: TokenId) -> bool {
    lower_than_shift(list, tok) || matches!(list.text(tok), "<<" | ">>")
}

fn lower_than_mul_div(list: &TokenList, tok: TokenId) -> bool {
    lower_than_plus_minus(list, tok) || matches!(list.text(tok), "+" | "-")
}

fn lower_eq_mul_div(list: &TokenList, tok: TokenId) -> bool {
    lower_than_mul_div(list, tok) || list.matches(Some(tok), "[*/%]")
}

/// Is `lhs / rhs` a whole number (so `* lhs / rhs` may fold)?
fn divides_evenly(list: &TokenList, num: TokenId, denom: &str) -> bool {
    match mathlib::divide(list.text(num), denom) {
        Ok(quotient) => list.text(num) == mathlib::multiply(denom, &quotient),
        Err(_) => false,
    }
}

/// Fold `num op num` runs anchored at `tok` (the token before the left
/// operand). Folding repeats while the result remains adjacent to further
/// foldable operations.
pub(crate) fn fold_constants_at(
    list: &mut TokenList,
    mut tok: TokenId,
) -> Result<bool, SimplifyError> {
    let mut ret = false;
    while list.at(tok, 4).is_some()
        && list.at(tok, 1).is_some_and(|t| list.is_number(t))
        && list.at(tok, 3).is_some_and(|t| list.is_number(t))
    {
        let (Some(lhs), Some(op), Some(rhs), Some(after)) = (
            list.at(tok, 1),
            list.at(tok, 2),
            list.at(tok, 3),
            list.at(tok, 4),
        ) else {
            break;
        };

        if !mathlib::is_int(list.text(lhs)) || !mathlib::is_int(list.text(rhs)) {
            break;
        }

        let whole_division = list.matches(Some(tok), "* %num% /")
            && list.str_at(tok, 3) != "0"
            && divides_evenly(list, lhs, &list.str_at(tok, 3).to_string());
        if !whole_division {
            let op_text = list.text(op);
            let legal = match op_text {
                "*" => {
                    (lower_than_mul_div(list, tok) || list.text(tok) == "*")
                        && lower_eq_mul_div(list, after)
                }
                "/" | "%" => lower_than_mul_div(list, tok) && lower_eq_mul_div(list, after),
                "+" | "-" => lower_than_mul_div(list, tok) && lower_than_mul_div(list, after),
                ">>" | "<<" => lower_than_shift(list, tok) && lower_than_plus_minus(list, after),
                "&" => lower_than_shift(list, tok) && lower_than_shift(list, after),
                "^" => lower_than_and(list, tok) && lower_than_and(list, after),
                "|" => lower_than_xor(list, tok) && lower_than_xor(list, after),
                _ => false,
            };
            if !legal {
                break;
            }
        }

        tok = lhs;

        // never fold a division or modulo by zero
        if list.matches(Some(op), "[/%] 0") {
            continue;
        }

        let op_char = list.text(op).chars().next().unwrap_or('\0');
        if matches!(list.text(op), ">>" | "<<" | "&" | "^" | "|") {
            let left = mathlib::to_long_number(list.text(tok));
            let right = mathlib::to_long_number(&list.str_at(tok, 2).to_string());
            let result = match op_char {
                '&' | '|' | '^' => {
                    let text = list.text(tok).to_string();
                    let rhs_text = list.str_at(tok, 2).to_string();
                    mathlib::calculate(&text, &rhs_text, op_char).ok()
                }
                '<' | '>' => {
                    // a "<<" before the left operand means stream output
                    if right >= 64 || (op_char == '<' && list.str_at(tok, -1) == "<<") {
                        break;
                    } else if right == 0 {
                        None
                    } else if op_char == '<' {
                        Some(left.wrapping_shl(right as u32).to_string())
                    } else {
                        Some((left >> right).to_string())
                    }
                }
                _ => None,
            };
            if let Some(result) = result {
                ret = true;
                list.set_text(tok, result);
                list.delete_next(tok, 2);
                continue;
            }
            // x << 0 and x >> 0: the operand pair is dropped below
        } else if list.matches(list.at(tok, -1), "- %num% - %num%") {
            let sum = mathlib::add(list.text(tok), &list.str_at(tok, 2).to_string());
            list.set_text(tok, sum);
        } else if list.matches(list.at(tok, -1), "- %num% + %num%") {
            let diff = mathlib::subtract(list.text(tok), &list.str_at(tok, 2).to_string());
            list.set_text(tok, diff);
        } else {
            let text = list.text(tok).to_string();
            let rhs_text = list.str_at(tok, 2).to_string();
            let result = mathlib::calculate(&text, &rhs_text, op_char)
                .map_err(|err| SimplifyError::arithmetic(err, tok))?;
            list.set_text(tok, result);
        }

        list.delete_next(tok, 2);
        ret = true;
    }
    Ok(ret)
}

/// One pass of stream-wide simplification. Returns whether anything
/// changed; callers loop while it does.
pub fn simplify_calculations(list: &mut TokenList) -> Result<bool, SimplifyError> {
    let mut ret = false;
    let mut cur = list.front();
    while let Some(mut tok) = cur {
        // Remove parentheses around a lone variable, unless the context is
        // a cast, an operator declaration, or a function-pointer type.
        let paren_var = list.matches(list.next(tok), "( %var% ) ;|)|,|]")
            || (list.matches(list.next(tok), "( %var% )")
                && list.at(tok, 4).is_some_and(|t| list.is_const_op(t))
                && !list.matches(list.at(tok, 4), "[*&+-]"));
        if paren_var
            && !list.is_name(tok)
            && list.text(tok) != ">"
            && list.text(tok) != "]"
            && list.str_at(tok, -1) != "operator"
            && !list.simple_match(list.prev(tok), "* )")
            && !list.simple_match(list.prev(tok), ") )")
            && !list.matches(list.at(tok, -2), "* %var% )")
            && !list.matches(list.at(tok, -2), "%type% ( ) ( %var%")
            && !list.matches(Some(tok), ") ( %var% ) ;")
        {
            list.delete_next(tok, 1);
            if let Some(inner) = list.next(tok) {
                tok = inner;
            }
            list.delete_next(tok, 1);
            ret = true;
        }

        // Char literal compared in a boolean context folds to its byte value.
        if list.matches(list.at(tok, -1), "(|&&|%oror% %char% %cop% %num% &&|%oror%|)") {
            let byte = list.text(tok).as_bytes()[1];
            list.set_text(tok, byte.to_string());
        }

        if list.is_number(tok) {
            // Redundant conditions: (0 && x), (1 || x)
            if list.matches(list.at(tok, -1), "[(=,] 0 &&")
                || list.matches(list.at(tok, -1), "[(=,] 1 %oror%")
            {
                let mut par = 0u32;
                let mut tok2 = Some(tok);
                while let Some(t2) = tok2 {
                    match list.text(t2) {
                        "(" => par += 1,
                        ")" => {
                            if par == 0 {
                                break;
                            }
                            par -= 1;
                        }
                        "," | ";" | "?" if par == 0 => break,
                        _ => {}
                    }
                    tok2 = list.next(t2);
                }
                if tok2.is_some_and(|t2| list.matches(Some(t2), "[);,?]")) {
                    list.erase_between(tok, tok2);
                    ret = true;
                }
                cur = list.next(tok);
                continue;
            }

            if list.text(tok) == "0" {
                if list.matches(list.at(tok, -1), "[+-|] 0") {
                    if let Some(prev) = list.prev(tok) {
                        tok = prev;
                    }
                    if list.matches(list.at(tok, -4), "[;{}] %var% = %var% [+-|] 0 ;")
                        && list.str_at(tok, -3) == list.str_at(tok, -1)
                    {
                        if let Some(lhs_var) = list.at(tok, -3) {
                            tok = lhs_var;
                        }
                        list.delete_next(tok, 2);
                        list.delete_this(tok);
                    }
                    list.delete_next(tok, 1);
                    list.delete_this(tok);
                    ret = true;
                } else if list.matches(list.at(tok, -1), "[=([,] 0 [+|]")
                    || list.matches(list.at(tok, -1), "return|case 0 [+|]")
                {
                    list.delete_next(tok, 1);
                    list.delete_this(tok);
                    ret = true;
                } else if list.matches(list.at(tok, -1), "[=[(,] 0 * %var% ,|]|)|;|=|%op%")
                    || list.matches(list.at(tok, -1), "[=[(,] 0 * %num% ,|]|)|;|%op%")
                    || list.matches(list.at(tok, -1), "[=[(,] 0 * (")
                    || list.matches(list.at(tok, -1), "return|case 0 *|&& %var% ,|:|;|=|%op%")
                    || list.matches(list.at(tok, -1), "return|case 0 *|&& %num% ,|:|;|%op%")
                    || list.matches(list.at(tok, -1), "return|case 0 *|&& (")
                {
                    list.delete_next(tok, 1);
                    if list.str_at(tok, 1) == "(" {
                        let close = list.link_at(tok, 1);
                        list.erase_between(tok, close);
                    }
                    list.delete_next(tok, 1);
                    ret = true;
                } else if list.matches(list.at(tok, -1), "[=[(,] 0 && *|& %any% ,|]|)|;|=|%op%")
                    || list
                        .matches(list.at(tok, -1), "return|case 0 && *|& %any% ,|:|;|=|%op%")
                {
                    list.delete_next(tok, 1);
                    list.delete_next(tok, 1);
                    if list.str_at(tok, 1) == "(" {
                        let close = list.link_at(tok, 1);
                        list.erase_between(tok, close);
                    }
                    list.delete_next(tok, 1);
                    ret = true;
                }
            }

            if list.text(tok) == "1" {
                if list.matches(list.at(tok, -1), "[=[(,] 1 %oror% %any% ,|]|)|;|=|%op%")
                    || list
                        .matches(list.at(tok, -1), "return|case 1 %oror% %any% ,|:|;|=|%op%")
                {
                    list.delete_next(tok, 1);
                    if list.str_at(tok, 1) == "(" {
                        let close = list.link_at(tok, 1);
                        list.erase_between(tok, close);
                    }
                    list.delete_next(tok, 1);
                    ret = true;
                } else if list
                    .matches(list.at(tok, -1), "[=[(,] 1 %oror% *|& %any% ,|]|)|;|=|%op%")
                    || list.matches(
                        list.at(tok, -1),
                        "return|case 1 %oror% *|& %any% ,|:|;|=|%op%",
                    )
                {
                    list.delete_next(tok, 1);
                    list.delete_next(tok, 1);
                    if list.str_at(tok, 1) == "(" {
                        let close = list.link_at(tok, 1);
                        list.erase_between(tok, close);
                    }
                    list.delete_next(tok, 1);
                    ret = true;
                }
            }

            if list.simple_match(list.prev(tok), "* 1") || list.simple_match(Some(tok), "1 *") {
                if let Some(prev) = list.prev(tok).filter(|&p| list.is_const_op(p)) {
                    tok = prev;
                }
                list.delete_next(tok, 1);
                list.delete_this(tok);
                ret = true;
            }

            // Remove parentheses around a lone number
            if list.matches(list.at(tok, -2), "%any% ( %num% )")
                && list.at(tok, -2).is_some_and(|t| !list.is_name(t))
                && list.str_at(tok, -2) != ">"
            {
                if let Some(open) = list.prev(tok) {
                    tok = open;
                }
                list.delete_this(tok);
                list.delete_next(tok, 1);
                ret = true;
            }

            if list.simple_match(list.prev(tok), "( 0 ||")
                || list.simple_match(list.prev(tok), "|| 0 )")
                || list.simple_match(list.prev(tok), "( 0 |")
                || list.simple_match(list.prev(tok), "| 0 )")
                || list.simple_match(list.prev(tok), "( 1 &&")
                || list.simple_match(list.prev(tok), "&& 1 )")
            {
                if let Some(prev) = list.prev(tok).filter(|&p| list.is_const_op(p)) {
                    tok = prev;
                }
                list.delete_next(tok, 1);
                list.delete_this(tok);
                ret = true;
            }

            if list.matches(Some(tok), "%num% %cop% %num%")
                && mathlib::is_int(list.text(tok))
                && mathlib::is_int(list.str_at(tok, 2))
                && list.matches(list.prev(tok), "(|&&|%oror%")
                && list.matches(list.at(tok, 3), ")|&&|%oror%|?")
            {
                let op1 = mathlib::to_long_number(list.text(tok));
                let op2 = mathlib::to_long_number(list.str_at(tok, 2));
                let truth = match list.str_at(tok, 1) {
                    "==" => op1 == op2,
                    "!=" => op1 != op2,
                    "<=" => op1 <= op2,
                    ">=" => op1 >= op2,
                    "<" => op1 < op2,
                    _ => op1 > op2,
                };
                list.set_text(tok, if truth { "1" } else { "0" });
                list.delete_next(tok, 2);
                ret = true;
            }
        } else {
            ret |= fold_constants_at(list, tok)?;
        }

        cur = list.next(tok);
    }
    Ok(ret)
}
