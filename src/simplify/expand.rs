//! Specialization expansion and the monomorphization loop.

use super::{
    calc, instantiate_match, report_debug, template_name_position, template_parameters,
};
use crate::errors::{ErrorSink, SimplifyError};
use crate::settings::Settings;
use crate::tokens::{TokenId, TokenList};
use rustc_hash::FxHashSet;

/// First position at or after `from` where every lexeme of the
/// space-separated `pattern` matches literally.
fn find_simple(list: &TokenList, from: TokenId, pattern: &str) -> Option<TokenId> {
    let mut cur = Some(from);
    while let Some(tok) = cur {
        if list.simple_match_str(Some(tok), pattern) {
            return Some(tok);
        }
        cur = list.next(tok);
    }
    None
}

/// Drop `target` from the instantiation work list, keeping `idx` (the
/// position of the next element to process) in step with the shifts.
fn remove_instantiation(instantiations: &mut Vec<TokenId>, idx: &mut usize, target: TokenId) {
    let mut k = 0;
    while k < instantiations.len() {
        if instantiations[k] == target {
            instantiations.remove(k);
            if k < *idx && *idx > 0 {
                *idx -= 1;
            }
        } else {
            k += 1;
        }
    }
}

// ── Specializations (S1) ────────────────────────────────────

/// Turn every user-written `template<> name<args>(…)` definition into a
/// pre-existing monomorph: the definition and all matching uses are
/// renamed to the mangled `name<args>` identifier. Returns the set of
/// mangled names so the instantiation loop never re-expands them.
pub(crate) fn expand_specialized(list: &mut TokenList) -> FxHashSet<String> {
    let mut expanded = FxHashSet::default();

    let mut cur = list.front();
    while let Some(tok) = cur {
        if !list.simple_match(Some(tok), "template < >") {
            cur = list.next(tok);
            continue;
        }

        // what kind of template is this?
        let mut tok2 = list.at(tok, 3);
        while let Some(t) = tok2 {
            if !(list.is_name(t) || list.text(t) == "*") {
                break;
            }
            tok2 = list.next(t);
        }
        let found = tok2
            .filter(|&lt| template_parameters(list, lt) > 0)
            .and_then(|lt| list.prev(lt))
            .filter(|&name_tok| list.is_name(name_tok));
        let Some(name_tok) = found else {
            cur = list.next(tok);
            continue;
        };

        // spell out "name < args" and require "> (" behind it
        let mut spaced = String::new();
        let mut t3 = Some(name_tok);
        let mut closing = None;
        while let Some(t) = t3 {
            if list.text(t) == ">" {
                closing = Some(t);
                break;
            }
            if !spaced.is_empty() {
                spaced.push(' ');
            }
            spaced.push_str(list.text(t));
            t3 = list.next(t);
        }
        if !list.simple_match(closing, "> (") {
            cur = list.next(tok);
            continue;
        }

        let pattern = format!("{spaced} > (");
        let name: String = spaced
            .chars()
            .filter(|c| !c.is_whitespace())
            .chain(std::iter::once('>'))
            .collect();
        expanded.insert(name.clone());

        // rename the definition
        let open_paren = list.find_simple(name_tok, "(");
        list.erase_between(name_tok, open_paren);
        list.set_text(name_tok, name.as_str());

        // delete the "template < >" prefix
        list.delete_next(tok, 2);
        list.delete_this(tok);

        // rewrite every matching use
        let mut search = Some(name_tok);
        while let Some(site) = search.and_then(|from| find_simple(list, from, &pattern)) {
            let open = list.find_simple(site, "(");
            list.erase_between(site, open);
            list.set_text(site, name.as_str());
            search = Some(site);
        }

        cur = list.next(tok);
    }

    expanded
}

// ── Monomorphization (S4) ───────────────────────────────────

/// Monomorphize one declaration: for every matching use site, build the
/// mangled name, copy the declaration body once per unseen name, and
/// rewrite all equivalent use sites. Returns whether at least one copy was
/// generated (so the caller can delete the declaration).
pub(crate) fn instantiate_declaration(
    list: &mut TokenList,
    sink: &mut dyn ErrorSink,
    settings: &Settings,
    decl: TokenId,
    instantiations: &mut Vec<TokenId>,
    expanded: &mut FxHashSet<String>,
) -> Result<bool, SimplifyError> {
    // formal type parameter name tokens, e.g. "T"
    let mut formal_params: Vec<TokenId> = Vec::new();
    let mut cur = list.at(decl, 2);
    let mut decl_gt = None;
    while let Some(tok) = cur {
        if list.text(tok) == ">" {
            decl_gt = Some(tok);
            break;
        }
        if list.matches(Some(tok), "%var% ,|>") {
            formal_params.push(tok);
        }
        cur = list.next(tok);
    }
    let Some(decl_gt) = decl_gt else {
        return Ok(false);
    };

    let Some(namepos) = template_name_position(list, decl_gt) else {
        if settings.debug_warnings {
            report_debug(sink, list, decl_gt, "simplify_templates: bailing out");
        }
        return Ok(false);
    };
    let name = list.str_at(decl_gt, namepos as isize).to_string();
    let is_func = list.str_at(decl_gt, namepos as isize + 1) == "(";

    let mut known_count = instantiations.len();
    let mut recursive_count = 0u32;
    let mut instantiated = false;

    let mut idx = 0usize;
    while idx < instantiations.len() {
        // new use sites appeared: fold value arguments before looking at
        // them, with a cap as a divergence guard
        if known_count != instantiations.len() {
            known_count = instantiations.len();
            calc::simplify_calculations(list)?;
            recursive_count += 1;
            if recursive_count > 100 {
                break;
            }
        }

        let use_tok = instantiations[idx];
        idx += 1;

        if list.text(use_tok) != name {
            continue;
        }
        if list.matches(list.prev(use_tok), "[;{}=]")
            && !instantiate_match(
                list,
                use_tok,
                &name,
                formal_params.len(),
                Some(if is_func { "(" } else { "*| %var%" }),
            )
        {
            continue;
        }

        // walk the argument list: collect the first token of each argument
        // and build the canonical type text with qualifiers spelled out
        let mut types_used: Vec<TokenId> = Vec::new();
        let mut type_text = String::new();
        let mut match_pattern = format!("{name} < ");
        let mut indentlevel = 0usize;
        let mut tok3_opt = list.at(use_tok, 2);
        while let Some(tok3) = tok3_opt {
            if indentlevel == 0 && list.text(tok3) == ">" {
                break;
            }
            // unhandled parentheses or array brackets: bail out
            if matches!(list.text(tok3), "(" | "[") {
                type_text.clear();
                break;
            }
            if list.next(tok3).is_none() {
                type_text.clear();
                break;
            }
            if list.matches(list.at(tok3, -2), "[<,] %var% <")
                && template_parameters(list, tok3) > 0
            {
                indentlevel += 1;
            } else if indentlevel > 0 && list.matches(Some(tok3), "> [,>]") {
                indentlevel -= 1;
            } else if indentlevel > 0 && list.text(tok3) == ">>" {
                if indentlevel == 1 {
                    match_pattern.push('>');
                    type_text.push('>');
                    break;
                }
                indentlevel -= 2;
            }
            match_pattern.push_str(if list.text(tok3) == ">>" {
                "> >"
            } else {
                list.text(tok3)
            });
            match_pattern.push(' ');
            if indentlevel == 0 && list.matches(list.prev(tok3), "[<,]") {
                types_used.push(tok3);
            }
            if list.text(tok3) != "class" {
                let token = list.token(tok3);
                if token.is_unsigned {
                    type_text.push_str("unsigned");
                } else if token.is_signed {
                    type_text.push_str("signed");
                }
                if token.is_long {
                    type_text.push_str("long");
                }
                type_text.push_str(list.text(tok3));
            }
            tok3_opt = list.next(tok3);
        }
        match_pattern.push('>');

        if type_text.is_empty() || formal_params.len() != types_used.len() {
            if settings.debug_warnings {
                report_debug(
                    sink,
                    list,
                    decl_gt,
                    "Failed to instantiate template. The checking continues anyway.",
                );
            }
            if type_text.is_empty() {
                continue;
            }
            break;
        }

        let new_name = format!("{name}<{type_text}>");

        if !expanded.contains(&new_name) {
            expanded.insert(new_name.clone());
            expand_declaration(
                list,
                decl_gt,
                &name,
                &formal_params,
                &new_name,
                &types_used,
                instantiations,
            );
            instantiated = true;
        }

        // rewrite every use site spelled like this one
        let mut remove_ranges: Vec<(TokenId, Option<TokenId>)> = Vec::new();
        let mut tok4_opt = Some(use_tok);
        while let Some(tok4) = tok4_opt {
            if !list.simple_match_str(Some(tok4), &match_pattern) {
                tok4_opt = list.next(tok4);
                continue;
            }

            // the argument qualifiers must agree element-wise with the
            // instantiation that produced the mangled name
            let mut tok5_opt = list.at(tok4, 2);
            let mut type_count = 1usize;
            let mut typetok = types_used.first().copied();
            let mut indent5 = 0usize;
            while let Some(tok5) = tok5_opt {
                let text5 = list.text(tok5);
                if indent5 == 0 && text5 == ">" {
                    break;
                }
                if text5 == "<" && template_parameters(list, tok5) > 0 {
                    indent5 += 1;
                } else if indent5 > 0 && list.matches(Some(tok5), "> [,>]") {
                    indent5 -= 1;
                } else if indent5 == 0 {
                    if text5 != "," {
                        let Some(tt) = typetok else { break };
                        let a = list.token(tok5);
                        let b = list.token(tt);
                        if a.is_unsigned != b.is_unsigned
                            || a.is_signed != b.is_signed
                            || a.is_long != b.is_long
                        {
                            break;
                        }
                        typetok = list.next(tt);
                    } else {
                        typetok = types_used.get(type_count).copied();
                        type_count += 1;
                    }
                }
                tok5_opt = list.next(tok5);
            }

            if tok5_opt.is_some_and(|t5| list.text(t5) == ">")
                && type_count == types_used.len()
            {
                let tok5 = tok5_opt;
                list.set_text(tok4, new_name.as_str());
                // interior identifiers are subsumed by the mangled name
                let mut tok6_opt = list.next(tok4);
                while let Some(tok6) = tok6_opt {
                    if Some(tok6) == tok5 {
                        break;
                    }
                    if list.is_name(tok6) {
                        remove_instantiation(instantiations, &mut idx, tok6);
                    }
                    tok6_opt = list.next(tok6);
                }
                remove_ranges.push((tok4, tok5.and_then(|t5| list.next(t5))));
            }

            match tok5_opt {
                Some(t5) => tok4_opt = list.next(t5),
                None => break,
            }
        }
        for (from, to) in remove_ranges.into_iter().rev() {
            list.erase_between(from, to);
        }
    }

    Ok(instantiated)
}

// ── The copier (S4 support) ─────────────────────────────────

/// Copy the declaration whose header ends at `decl_gt` to the end of the
/// list, substituting formal type parameters with the actual argument
/// token runs and the base name with the mangled name. Out-of-class
/// member definitions are copied the same way. Newly produced `Type <`
/// sequences register as further instantiation work.
pub(crate) fn expand_declaration(
    list: &mut TokenList,
    decl_gt: TokenId,
    name: &str,
    formal_params: &[TokenId],
    new_name: &str,
    actual_types: &[TokenId],
    instantiations: &mut Vec<TokenId>,
) {
    let mut cur = list.front();
    'outer: while let Some(entry) = cur {
        let mut tok3 = entry;
        if matches!(list.text(tok3), "{" | "(" | "[") {
            match list.link(tok3) {
                Some(close) => tok3 = close,
                None => {
                    cur = list.next(tok3);
                    continue;
                }
            }
        }

        if tok3 == decl_gt {
            // the declaration itself: copy starts after the header
            match list.next(tok3) {
                Some(next) => tok3 = next,
                None => break,
            }
        } else if instantiate_match(
            list,
            tok3,
            name,
            formal_params.len(),
            Some(":: ~| %var% ("),
        ) {
            // member function implemented outside the class body
            let token = list.token(tok3);
            let (line, file_index) = (token.line, token.file_index);
            list.push_text(new_name, line, file_index);
            while list.text(tok3) != "::" {
                match list.next(tok3) {
                    Some(next) => tok3 = next,
                    None => break 'outer,
                }
            }
        } else {
            cur = list.next(tok3);
            continue;
        }

        let mut indentlevel = 0usize;
        let mut brackets: Vec<TokenId> = Vec::new();
        let mut cur3 = Some(tok3);
        let mut resume = None;
        while let Some(t3) = cur3 {
            let token = list.token(t3);
            let (line, file_index) = (token.line, token.file_index);

            if list.is_name(t3) {
                if let Some(itype) = formal_params
                    .iter()
                    .position(|&p| list.text(p) == list.text(t3))
                {
                    // formal parameter: emit the actual argument tokens
                    let mut type_indent = 0usize;
                    let mut typetok_opt = Some(actual_types[itype]);
                    while let Some(tt) = typetok_opt {
                        if type_indent == 0 && list.matches(Some(tt), ",|>|>>") {
                            break;
                        }
                        if list.matches(Some(tt), "%var% <")
                            && list
                                .next(tt)
                                .is_some_and(|lt| template_parameters(list, lt) > 0)
                        {
                            type_indent += 1;
                        } else if type_indent > 0 && list.text(tt) == ">" {
                            type_indent -= 1;
                        } else if type_indent > 0 && list.text(tt) == ">>" {
                            if type_indent == 1 {
                                break;
                            }
                            type_indent -= 2;
                        }
                        list.push_copy(tt, line, file_index);
                        typetok_opt = list.next(tt);
                    }
                    cur3 = list.next(t3);
                    continue;
                }
            }

            // the base name itself (not a nested use) becomes the mangled name
            if list.text(t3) == name && list.str_at(t3, 1) != "<" {
                list.push_text(new_name, line, file_index);
                cur3 = list.next(t3);
                continue;
            }

            let copied = list.push_copy(t3, line, file_index);
            if list.matches(Some(t3), "%type% <") {
                instantiations.push(copied);
            } else if list.text(t3) == "{" {
                brackets.push(copied);
                indentlevel += 1;
            } else if matches!(list.text(t3), "(" | "[") {
                brackets.push(copied);
            } else if list.text(t3) == "}" {
                if let Some(open) = brackets.pop() {
                    list.create_mutual_links(open, copied);
                }
                if indentlevel <= 1 && brackets.is_empty() {
                    resume = list.next(t3);
                    break;
                }
                indentlevel -= 1;
            } else if matches!(list.text(t3), ")" | "]") {
                if let Some(open) = brackets.pop() {
                    list.create_mutual_links(open, copied);
                }
            }

            cur3 = list.next(t3);
        }
        cur = resume;
    }
}
