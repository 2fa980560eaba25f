//! Template elimination over a preprocessed C++ token stream.
//!
//! The pipeline rewrites the stream in place so that downstream checks
//! only see monomorphized, template-free code:
//!
//! 1. specialization expansion (`template<> f<int>(…)` becomes a mangled
//!    identifier),
//! 2. declaration discovery,
//! 3. instantiation discovery and default-argument propagation,
//! 4. monomorphization of each declaration for each used argument tuple,
//! 5. removal of the consumed declarations plus residue cleanup.
//!
//! Everything is best effort: malformed constructs are either erased or
//! left inert, and an unresolvable template simply stays in the stream.

pub mod calc;
pub mod expand;

use crate::errors::{ErrorMessage, ErrorSink, Severity, SimplifyError};
use crate::settings::Settings;
use crate::tokens::pattern::Pattern;
use crate::tokens::{TokenId, TokenList};
use rustc_hash::FxHashSet;

/// By-products of a simplification run.
#[derive(Debug, Clone, Copy)]
pub struct TemplateOutcome {
    /// Whether the input contained any template declaration at all.
    pub code_with_templates: bool,
}

/// Entry point: eliminate templates from `list`. Bail-outs are reported
/// through `sink` as debug events when `settings.debug_warnings` is set;
/// the only hard failure is an arithmetic error inside constant folding.
pub fn simplify_templates(
    list: &mut TokenList,
    sink: &mut dyn ErrorSink,
    settings: &Settings,
) -> Result<TemplateOutcome, SimplifyError> {
    let mut expanded = expand::expand_specialized(list);

    let (templates, code_with_templates) = template_declarations(list);
    if templates.is_empty() {
        return Ok(TemplateOutcome { code_with_templates });
    }

    // Remove "typename" unless used inside template parameter lists.
    let mut cur = list.front();
    while let Some(tok) = cur {
        if list.text(tok) == "typename" {
            list.delete_this(tok);
        }
        if list.simple_match(Some(tok), "template <") {
            let mut t = Some(tok);
            while let Some(x) = t {
                if list.text(x) == ">" {
                    break;
                }
                t = list.next(x);
            }
            match t {
                Some(gt) => {
                    cur = list.next(gt);
                    continue;
                }
                None => break,
            }
        }
        cur = list.next(tok);
    }

    split_shift_closers(list);

    // Canonicalize value arguments (S<1+2> must be discovered as S<3>).
    while calc::simplify_calculations(list)? {}

    let mut instantiations = template_instantiations(list);
    if instantiations.is_empty() {
        return Ok(TemplateOutcome { code_with_templates });
    }

    fill_default_arguments(list, &templates, &mut instantiations);

    let mut instantiated = Vec::new();
    for &decl in templates.iter().rev() {
        if expand::instantiate_declaration(
            list,
            sink,
            settings,
            decl,
            &mut instantiations,
            &mut expanded,
        )? {
            instantiated.push(decl);
        }
    }
    for decl in instantiated {
        remove_declaration(list, decl);
    }

    cleanup_after_simplify(list);

    Ok(TemplateOutcome { code_with_templates })
}

pub(crate) fn report_debug(
    sink: &mut dyn ErrorSink,
    list: &TokenList,
    tok: TokenId,
    message: &str,
) {
    let token = list.token(tok);
    sink.report(ErrorMessage {
        callstack: vec![(token.file_index, token.line)],
        severity: Severity::Debug,
        id: "debug".to_string(),
        message: message.to_string(),
        inconclusive: false,
    });
}

// ── Parameter counting ──────────────────────────────────────

/// Number of top-level arguments in the `<…>` list starting at `tok`, or 0
/// when the list is malformed or not actually a template-argument list.
pub fn template_parameters(list: &TokenList, tok: TokenId) -> usize {
    if list.text(tok) != "<" {
        return 0;
    }
    let mut count = 1usize;
    let mut level = 0usize;
    let mut cur = list.next(tok);
    loop {
        if cur.is_some_and(|t| list.text(t) == "const") {
            cur = cur.and_then(|t| list.next(t));
        }
        if list.matches(cur, "struct|union") {
            cur = cur.and_then(|t| list.next(t));
        }
        if list.matches(cur, "& ::| %var%") {
            cur = cur.and_then(|t| list.next(t));
        }
        if cur.is_some_and(|t| list.text(t) == "::") {
            cur = cur.and_then(|t| list.next(t));
        }
        while list.matches(cur, "%var% ::") {
            cur = cur.and_then(|t| list.at(t, 2));
        }
        let Some(t) = cur else { return 0 };

        // a qualified name, number, or char literal
        if !list.is_number(t) && !list.is_char_lit(t) && !list.is_name(t) {
            return 0;
        }
        cur = list.next(t);
        if cur.is_none() {
            return 0;
        }

        while list.matches(cur, "*|&|const") {
            cur = cur.and_then(|t| list.next(t));
        }
        if cur.is_none() {
            return 0;
        }

        // function pointer or array trailer
        while cur.is_some_and(|t| matches!(list.text(t), "(" | "[")) {
            let Some(close) = cur.and_then(|t| list.link(t)) else {
                return 0;
            };
            cur = list.next(close);
        }
        if cur.is_none() {
            return 0;
        }

        // nested template
        if cur.is_some_and(|t| list.text(t) == "<") {
            level += 1;
            cur = cur.and_then(|t| list.next(t));
        }
        if cur.is_none() {
            return 0;
        }

        while cur.is_some_and(|t| matches!(list.text(t), ">" | ">>")) {
            let Some(t) = cur else { return 0 };
            if level == 0 {
                return count;
            }
            level -= 1;
            if list.text(t) == ">>" {
                if level == 0 {
                    return count;
                }
                level -= 1;
            }
            cur = list.next(t);
            while list.matches(cur, "[*&]") {
                cur = cur.and_then(|x| list.next(x));
            }
            if cur.is_none() {
                return 0;
            }
        }

        let Some(t) = cur else { return 0 };
        if list.text(t) != "," {
            continue;
        }
        if level == 0 {
            count += 1;
        }
        cur = list.next(t);
    }
}

// ── Discovery ───────────────────────────────────────────────

/// Collect declaration head tokens (`template` keywords whose body is a
/// definition). Declarations inside namespaces are deliberately skipped;
/// namespaced templates are not monomorphized.
pub fn template_declarations(list: &TokenList) -> (Vec<TokenId>, bool) {
    let mut templates = Vec::new();
    let mut code_with_templates = false;
    let mut cur = list.front();
    while let Some(start) = cur {
        let mut tok = start;
        // TODO: instantiate templates defined inside namespaces as well
        if list.matches(Some(tok), "namespace %type% {") {
            if let Some(close) = list.link_at(tok, 2) {
                tok = close;
            }
        }
        if list.simple_match(Some(tok), "template <") {
            code_with_templates = true;
            let mut t2 = Some(tok);
            while let Some(x) = t2 {
                // just a declaration: ignore
                if list.text(x) == ";" {
                    break;
                }
                // a definition: add it
                if list.text(x) == "{" {
                    templates.push(tok);
                    break;
                }
                t2 = list.next(x);
            }
        }
        cur = list.next(tok);
    }
    (templates, code_with_templates)
}

/// Collect use-site name tokens. Nested instantiations are pushed before
/// the enclosing one so the inner template is monomorphized first.
pub fn template_instantiations(list: &TokenList) -> Vec<TokenId> {
    let mut used = Vec::new();
    let mut cur = list.front();
    while let Some(tok) = cur {
        // skip over declaration headers
        if list.simple_match(Some(tok), "template <") {
            let Some(gt) = list.next(tok).and_then(|lt| list.find_closing_bracket(lt)) else {
                break;
            };
            cur = list.next(gt);
            continue;
        }
        if list.matches(list.prev(tok), "[({};=] %var% <")
            || list.matches(list.prev(tok), "%type% %var% <")
            || list.matches(list.at(tok, -2), "[,:] private|protected|public %var% <")
        {
            // walk to the ">" and scan backwards so inner instantiations
            // are added first
            let closing = list.next(tok).and_then(|lt| list.find_closing_bracket(lt));
            let mut t2 = closing;
            while let Some(t) = t2 {
                if t == tok {
                    break;
                }
                if list.matches(Some(t), "[<,] %var% <")
                    && list.at(t, 2).is_some_and(|lt| template_parameters(list, lt) > 0)
                {
                    if let Some(name_tok) = list.next(t) {
                        used.push(name_tok);
                    }
                }
                t2 = list.prev(t);
            }
            if list.next(tok).is_some_and(|lt| template_parameters(list, lt) > 0) {
                used.push(tok);
            }
        }
        cur = list.next(tok);
    }
    used
}

/// Split a `>>` that closes two nested template-argument lists into two
/// `>` tokens. Only applied where the `<` sits in an instantiation or
/// declaration position and the `>>` is reached at angle depth two or
/// more, so ordinary shift expressions are untouched.
fn split_shift_closers(list: &mut TokenList) {
    let mut cur = list.front();
    while let Some(tok) = cur {
        let is_site = list.text(tok) == "<"
            && (list.matches(list.at(tok, -2), "[({};=] %var% <")
                || list.matches(list.at(tok, -2), "%type% %var% <")
                || list.matches(list.at(tok, -3), "[,:] private|protected|public %var% <")
                || list.simple_match(list.prev(tok), "template <"));
        if is_site {
            let mut depth = 0usize;
            let mut t = Some(tok);
            while let Some(id) = t {
                match list.text(id) {
                    "(" | "[" => {
                        let Some(close) = list.link(id) else { break };
                        t = list.next(close);
                        continue;
                    }
                    "<" => depth += 1,
                    ">" => {
                        if depth <= 1 {
                            break;
                        }
                        depth -= 1;
                    }
                    ">>" => {
                        if depth < 2 {
                            break;
                        }
                        list.set_text(id, ">");
                        list.insert_after(id, ">", None);
                        depth -= 1;
                    }
                    ";" | "{" | "}" => break,
                    _ => {}
                }
                t = list.next(id);
            }
        }
        cur = list.next(tok);
    }
}

// ── Default-argument propagation ────────────────────────────

/// Append default template-argument values to under-supplied class
/// instantiations, then erase the `= value` ranges from the declaration so
/// every later stage sees one canonical parameter list.
pub(crate) fn fill_default_arguments(
    list: &mut TokenList,
    templates: &[TokenId],
    instantiations: &mut Vec<TokenId>,
) {
    for &decl in templates {
        // the "=" tokens introducing default values
        let mut eq: Vec<TokenId> = Vec::new();
        let mut declared = 1usize;
        let mut classname = String::new();

        let mut cur = Some(decl);
        while let Some(tok) = cur {
            match list.text(tok) {
                ">" => {
                    if list.matches(Some(tok), "> class|struct %var%") {
                        classname = list.str_at(tok, 2).to_string();
                    }
                    break;
                }
                "," => declared += 1,
                "=" => eq.push(tok),
                _ => {}
            }
            cur = list.next(tok);
        }
        if eq.is_empty() || classname.is_empty() {
            continue;
        }

        let class_pattern = Pattern::compile(&format!("{classname} < %any%"));
        for idx in 0..instantiations.len() {
            let inst = instantiations[idx];
            if !list.matches_compiled(Some(inst), &class_pattern) {
                continue;
            }

            // count the supplied arguments
            let mut supplied = 1usize;
            let mut tok = list.at(inst, 3);
            while let Some(t) = tok {
                if list.text(t) == ">" {
                    break;
                }
                if list.text(t) != "," {
                    break;
                }
                supplied += 1;
                tok = list.at(t, 2);
            }
            let Some(gt) = tok.filter(|&t| list.text(t) == ">") else {
                continue;
            };

            let Some(mut insert_at) = list.prev(gt) else {
                continue;
            };
            let skip = supplied.saturating_sub(declared.saturating_sub(eq.len()));
            for &eqtok in eq.iter().skip(skip) {
                insert_at = list.insert_after(insert_at, ",", None);
                let mut from = list.next(eqtok);
                let mut links: Vec<TokenId> = Vec::new();
                while let Some(f) = from {
                    if links.is_empty() && matches!(list.text(f), "," | ">") {
                        break;
                    }
                    let text = list.text(f).to_string();
                    let original = list.token(f).original_name.clone();
                    insert_at = list.insert_after(insert_at, &text, original.as_deref());
                    if list.matches(Some(insert_at), "(|[") {
                        links.push(insert_at);
                    } else if !links.is_empty() && list.matches(Some(insert_at), ")|]") {
                        if let Some(open) = links.pop() {
                            list.create_mutual_links(open, insert_at);
                        }
                    }
                    from = list.next(f);
                }
            }
        }

        // erase the default values from the declaration
        for &eqtok in &eq {
            let mut tok2 = list.next(eqtok);
            let mut indentlevel = 0i32;
            while let Some(t2) = tok2 {
                if list.text(t2) == "(" {
                    tok2 = list.link(t2);
                } else if list.matches(Some(t2), "%type% <")
                    && list.next(t2).is_some_and(|lt| template_parameters(list, lt) > 0)
                {
                    // a nested use consumed into the declaration
                    instantiations.retain(|&i| i != t2);
                    indentlevel += 1;
                } else if indentlevel > 0 && list.text(t2) == ">" {
                    indentlevel -= 1;
                } else if indentlevel > 0 && list.text(t2) == ">>" {
                    indentlevel -= 2;
                    if indentlevel < 0 {
                        list.set_text(t2, ">");
                    }
                } else if indentlevel == 0 && list.matches(Some(t2), ",|>|>>") {
                    break;
                }
                if indentlevel < 0 {
                    break;
                }
                tok2 = tok2.and_then(|t| list.next(t));
            }
            list.erase_between(eqtok, tok2);
            list.delete_this(eqtok);
        }
    }
}

// ── Use-site matching ───────────────────────────────────────

/// Does `instance` name this template with the right number of arguments,
/// optionally followed by `pattern_after` beyond the closing `>`?
pub(crate) fn instantiate_match(
    list: &TokenList,
    instance: TokenId,
    name: &str,
    num_args: usize,
    pattern_after: Option<&'static str>,
) -> bool {
    if list.text(instance) != name || list.str_at(instance, 1) != "<" {
        return false;
    }
    let params = list
        .next(instance)
        .map_or(0, |lt| template_parameters(list, lt));
    if params != num_args {
        return false;
    }
    if let Some(pattern_after) = pattern_after {
        let mut indent = 0usize;
        let mut tok = Some(instance);
        while let Some(t) = tok {
            let text = list.text(t);
            if (text == ">" && indent == 0) || (text == ">>" && indent <= 1) {
                break;
            }
            if list.matches(Some(t), "[<,] %var% <")
                && list.at(t, 2).is_some_and(|lt| template_parameters(list, lt) > 0)
            {
                indent += 1;
            }
            if indent > 0 && text == ">" {
                indent -= 1;
            }
            if indent > 0 && text == ">>" {
                indent -= if indent > 1 { 2 } else { 1 };
            }
            tok = list.next(t);
        }
        let Some(closing) = tok else { return false };
        if !list.matches(list.next(closing), pattern_after) {
            return false;
        }
    }
    true
}

/// Offset of the class/function name after a template header's `>`, or
/// `None` when the declarator shape is not recognized.
pub(crate) fn template_name_position(list: &TokenList, gt: TokenId) -> Option<usize> {
    let mut namepos;
    if list.matches(Some(gt), "> class|struct %type% {|:") {
        namepos = 2;
    } else if list.matches(Some(gt), "> %type% *|&| %type% (") {
        namepos = 2;
    } else if list.matches(Some(gt), "> %type% %type% *|&| %type% (") {
        namepos = 3;
    } else {
        return None;
    }
    if matches!(list.str_at(gt, namepos), "*" | "&") {
        namepos += 1;
    }
    Some(namepos as usize)
}

// ── Declaration removal ─────────────────────────────────────

/// Remove a template declaration headed by `tok`. Returns whether a
/// well-formed declaration (or header) was deleted; malformed prefixes are
/// erased best-effort and yield `false`.
pub fn remove_declaration(list: &mut TokenList, tok: TokenId) -> bool {
    if !list.simple_match(Some(tok), "template <") {
        return false;
    }
    let mut indentlevel = 0usize;
    let mut countgt = 0usize;
    let mut cur = list.next(tok);
    while let Some(tok2) = cur {
        let text = list.text(tok2).to_string();

        if text == "(" {
            match list.link(tok2) {
                Some(close) => {
                    cur = list.next(close);
                    continue;
                }
                None => break,
            }
        } else if text == ")" {
            // garbage: drop the header and the stray ")"
            list.erase_between(tok, list.next(tok2));
            list.delete_this(tok);
            return false;
        } else if text == "{" {
            let Some(close) = list.link(tok2) else { break };
            let after = list.next(close);
            list.erase_between(tok, after);
            if after.is_some_and(|a| list.text(a) == ";" && list.next(a).is_some()) {
                list.delete_next(tok, 1);
            }
            list.delete_this(tok);
            return true;
        } else if text == "}" {
            // garbage: erase up to it
            list.erase_between(tok, Some(tok2));
            list.delete_this(tok);
            return false;
        }

        if text == ">" {
            countgt += 1;
        }

        // don't remove a constructor definition, only its header
        if text == "explicit"
            || (countgt == 1
                && list.matches(list.prev(tok2), "> %type% (")
                && list
                    .link_at(tok2, 1)
                    .is_some_and(|close| list.simple_match(Some(close), ") {")))
        {
            list.erase_between(tok, Some(tok2));
            list.delete_this(tok);
            return true;
        }

        if text == ";" {
            list.erase_between(tok, list.next(tok2));
            list.delete_this(tok);
            return true;
        }

        if text == "<" {
            indentlevel += 1;
        } else if indentlevel >= 2 && text == ">" {
            indentlevel -= 1;
        } else if list.matches(Some(tok2), "> class|struct %var% [,)]") {
            // template-template parameter: drop the header only
            list.erase_between(tok, list.next(tok2));
            list.delete_this(tok);
            return true;
        }

        cur = list.next(tok2);
    }
    false
}

// ── Cleanup ─────────────────────────────────────────────────

/// Final normalization: strip residual `template < > name` prefixes and
/// collapse `Name < T , U > (` runs into a single mangled identifier.
pub fn cleanup_after_simplify(list: &mut TokenList) {
    let mut goback = false;
    let mut cur = list.front();
    while let Some(mut tok) = cur {
        if goback {
            if let Some(prev) = list.prev(tok) {
                tok = prev;
            }
            goback = false;
        }
        if list.text(tok) == "(" {
            if let Some(close) = list.link(tok) {
                tok = close;
            }
        } else if list.matches(Some(tok), "template < > %var%") {
            let mut end = Some(tok);
            while let Some(e) = end {
                if list.text(e) == ";" {
                    break;
                }
                if list.text(e) == "{" {
                    end = list.link(e).and_then(|c| list.next(c));
                    break;
                }
                if !list.matches(Some(e), "%var%|::|<|>|>>|,") {
                    end = None;
                    break;
                }
                end = list.next(e);
            }
            if let Some(e) = end {
                list.erase_between(tok, Some(e));
                list.delete_this(tok);
            }
        } else if list.matches(Some(tok), "%type% <")
            && (list.prev(tok).is_none() || list.str_at(tok, -1) == ";")
        {
            let mut tok2 = list.at(tok, 2);
            let mut type_str = String::new();
            while let Some(t2) = tok2 {
                if !(list.matches(Some(t2), "%type% ,") || list.matches(Some(t2), "%num% ,")) {
                    break;
                }
                type_str.push_str(list.text(t2));
                type_str.push(',');
                tok2 = list.at(t2, 2);
            }
            if let Some(t2) = tok2.filter(|&t2| {
                list.matches(Some(t2), "%type% > (") || list.matches(Some(t2), "%num% > (")
            }) {
                type_str.push_str(list.text(t2));
                let mangled = format!("{}<{}>", list.text(tok), type_str);
                list.set_text(tok, mangled);
                list.erase_between(tok, list.at(t2, 2));
                if Some(tok) == list.front() {
                    goback = true;
                }
            }
        }
        cur = list.next(tok);
    }
}

// ── Angle-bracket sanity check ──────────────────────────────

/// Scan for a statement whose `<`/`>` angle brackets do not balance,
/// skipping executing scopes. Returns the first offending token, `None`
/// when everything balances. Callers use this to leave suspicious
/// statements alone.
pub fn unbalanced_angle_token(list: &TokenList) -> Option<TokenId> {
    let mut cur = list.front();
    while let Some(mut tok) = cur {
        // skip executing scopes
        if list.simple_match(Some(tok), "( {") {
            if let Some(close) = list.link(tok) {
                tok = close;
            }
        }
        if list.simple_match(Some(tok), ") {")
            || list.matches(Some(tok), ") %var% {")
            || list.matches(Some(tok), "[;,=] {")
        {
            while list.text(tok) != "{" {
                match list.next(tok) {
                    Some(n) => tok = n,
                    None => return None,
                }
            }
            if let Some(close) = list.link(tok) {
                tok = close;
            }
        } else if list.simple_match(Some(tok), "try {") {
            if let Some(close) = list.next(tok).and_then(|b| list.link(b)) {
                tok = close;
            }
            while list.simple_match(Some(tok), "} catch (") {
                let Some(close) = list.link_at(tok, 2) else { break };
                tok = close;
                if list.simple_match(Some(tok), ") {") {
                    if let Some(body_close) = list.next(tok).and_then(|b| list.link(b)) {
                        tok = body_close;
                    }
                }
            }
        }

        // only look at statement starts
        if list.prev(tok).is_some() && !list.matches(Some(tok), "[;{}]") {
            cur = list.next(tok);
            continue;
        }

        // skip ";;; typedef typename foo::bar::" style prefixes
        let mut t = Some(tok);
        while list.matches(t, "[;{}]") {
            t = t.and_then(|x| list.next(x));
        }
        while list.matches(t, "typedef|typename") {
            t = t.and_then(|x| list.next(x));
        }
        while list.matches(t, "%type% ::") {
            t = t.and_then(|x| list.at(x, 2));
        }
        let Some(stmt) = t else { return None };

        if list.matches(Some(stmt), "%type% <") {
            let mut usedtypes: FxHashSet<String> = FxHashSet::default();
            let mut level = 0usize;
            let mut tok2_opt = Some(stmt);
            while let Some(tok2) = tok2_opt {
                if list.matches(Some(tok2), "[;{}]") {
                    break;
                }
                match list.text(tok2) {
                    "(" => {
                        if let Some(close) = list.link(tok2) {
                            tok2_opt = list.next(close);
                            continue;
                        }
                    }
                    "<" => {
                        let mut inclevel = false;
                        if list.simple_match(list.prev(tok2), "operator <") {
                            // comparison operator definition
                        } else if level == 0 {
                            inclevel = true;
                        } else if list.next(tok2).is_some_and(|n| list.is_standard_type(n)) {
                            inclevel = true;
                        } else if list.simple_match(Some(tok2), "< typename") {
                            inclevel = true;
                        } else if list.matches(list.at(tok2, -2), "<|, %type% <")
                            && usedtypes.contains(list.str_at(tok2, -1))
                        {
                            inclevel = true;
                        } else if list.matches(Some(tok2), "< %type%")
                            && usedtypes.contains(list.str_at(tok2, 1))
                        {
                            inclevel = true;
                        } else if list.matches(Some(tok2), "< %type%") {
                            // a type rather than a value if another "<" follows
                            let mut t3 = list.next(tok2);
                            while list.matches(t3, "%type% ::") {
                                t3 = t3.and_then(|x| list.at(x, 2));
                            }
                            if list.matches(t3, "%type% <") {
                                inclevel = true;
                            }
                        }
                        if inclevel {
                            level += 1;
                            if list.matches(list.at(tok2, -2), "<|, %type% <") {
                                usedtypes.insert(list.str_at(tok2, -1).to_string());
                            }
                        }
                    }
                    ">" => {
                        if level > 0 {
                            level -= 1;
                        }
                    }
                    ">>" => {
                        if level > 0 {
                            level -= 1;
                        }
                        if level > 0 {
                            level -= 1;
                        }
                    }
                    _ => {}
                }
                tok2_opt = tok2_opt.and_then(|t2| list.next(t2));
            }
            if level > 0 {
                return Some(stmt);
            }
        }

        cur = list.next(stmt);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn lex(code: &str) -> TokenList {
        let (list, errors) = tokenize(code);
        assert!(errors.is_empty(), "lex errors: {errors:?}");
        list
    }

    fn nth(list: &TokenList, n: isize) -> TokenId {
        list.at(list.front().unwrap(), n).unwrap()
    }

    // ── template_parameters ─────────────────────────────────

    #[test]
    fn test_parameter_count_simple() {
        let list = lex("x < int > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 1);
        let list = lex("x < int , char > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 2);
    }

    #[test]
    fn test_parameter_count_qualified() {
        let list = lex("x < const std :: string & , int * > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 2);
        let list = lex("x < :: Foo > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 1);
        let list = lex("x < struct Foo > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 1);
    }

    #[test]
    fn test_parameter_count_nested() {
        let list = lex("x < A < int > , B > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 2);
        let list = lex("x < A < B < int >> > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 1);
    }

    #[test]
    fn test_parameter_count_function_pointer() {
        let list = lex("x < void ( * ) ( int ) > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 1);
        let list = lex("x < int [ 3 ] > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 1);
    }

    #[test]
    fn test_parameter_count_numbers() {
        let list = lex("x < 3 , 'c' > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 2);
    }

    #[test]
    fn test_parameter_count_malformed() {
        let list = lex("x < + > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 0);
        let list = lex("x < int ;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 0);
        let list = lex("x > y;");
        assert_eq!(template_parameters(&list, nth(&list, 1)), 0);
    }

    // ── discovery ───────────────────────────────────────────

    #[test]
    fn test_declaration_discovery() {
        let list = lex("template < class T > struct A { } ; A < int > a ;");
        let (templates, flag) = template_declarations(&list);
        assert!(flag);
        assert_eq!(templates.len(), 1);
        assert_eq!(list.text(templates[0]), "template");
    }

    #[test]
    fn test_forward_declaration_ignored() {
        let list = lex("template < class T > struct A ; int x ;");
        let (templates, flag) = template_declarations(&list);
        assert!(flag);
        assert!(templates.is_empty());
    }

    #[test]
    fn test_namespace_skipped() {
        let list = lex("namespace N { template < class T > struct A { } ; } int x ;");
        let (templates, flag) = template_declarations(&list);
        assert!(!flag);
        assert!(templates.is_empty());
    }

    #[test]
    fn test_instantiation_discovery() {
        let list = lex("template < class T > struct A { } ; A < int > a ;");
        let used = template_instantiations(&list);
        assert_eq!(used.len(), 1);
        assert_eq!(list.text(used[0]), "A");
    }

    #[test]
    fn test_instantiation_inner_first() {
        let mut list = lex("template < class T > struct V { } ; V < V < int >> w ;");
        split_shift_closers(&mut list);
        let used = template_instantiations(&list);
        assert_eq!(used.len(), 2);
        // the inner V comes before the outer V
        assert!(list.at(used[0], -1).is_some_and(|p| list.text(p) == "<"));
        assert!(list.at(used[1], -1).is_some_and(|p| list.text(p) == ";"));
    }

    #[test]
    fn test_shift_split_only_in_template_context() {
        let mut list = lex("x = a < b >> c ;");
        split_shift_closers(&mut list);
        assert_eq!(list.to_string(), "x = a < b >> c ;");
        let mut list = lex("; V < V < int >> w ;");
        split_shift_closers(&mut list);
        assert_eq!(list.to_string(), "; V < V < int > > w ;");
    }

    // ── default arguments ───────────────────────────────────

    #[test]
    fn test_default_argument_fill() {
        let mut list = lex("template < class T , int N = 2 > struct A { } ; A < char > a ;");
        let (templates, _) = template_declarations(&list);
        let mut used = template_instantiations(&list);
        fill_default_arguments(&mut list, &templates, &mut used);
        assert_eq!(
            list.to_string(),
            "template < class T , int N > struct A { } ; A < char , 2 > a ;"
        );
    }

    #[test]
    fn test_default_argument_not_needed() {
        let mut list = lex("template < class T , int N = 2 > struct A { } ; A < char , 7 > a ;");
        let (templates, _) = template_declarations(&list);
        let mut used = template_instantiations(&list);
        fill_default_arguments(&mut list, &templates, &mut used);
        assert_eq!(
            list.to_string(),
            "template < class T , int N > struct A { } ; A < char , 7 > a ;"
        );
    }

    #[test]
    fn test_default_argument_expression() {
        let mut list =
            lex("template < class T , int N = ( 2 ) > struct A { } ; A < char > a ;");
        let (templates, _) = template_declarations(&list);
        let mut used = template_instantiations(&list);
        fill_default_arguments(&mut list, &templates, &mut used);
        assert_eq!(
            list.to_string(),
            "template < class T , int N > struct A { } ; A < char , ( 2 ) > a ;"
        );
    }

    // ── name position ───────────────────────────────────────

    #[test]
    fn test_name_position() {
        let list = lex("> class Foo { } ;");
        assert_eq!(template_name_position(&list, nth(&list, 0)), Some(2));
        let list = lex("> int f ( ) { }");
        assert_eq!(template_name_position(&list, nth(&list, 0)), Some(2));
        let list = lex("> int * f ( ) { }");
        assert_eq!(template_name_position(&list, nth(&list, 0)), Some(3));
        let list = lex("> static int f ( ) { }");
        assert_eq!(template_name_position(&list, nth(&list, 0)), Some(3));
        let list = lex("> int x ;");
        assert_eq!(template_name_position(&list, nth(&list, 0)), None);
    }

    // ── removal state machine ───────────────────────────────

    fn removed(code: &str) -> (bool, String) {
        // garbage fixtures may carry unbalanced brackets; lex errors are fine
        let (mut list, _) = tokenize(code);
        let head = list.front().unwrap();
        let result = remove_declaration(&mut list, head);
        (result, list.to_string())
    }

    #[test]
    fn test_remove_definition() {
        let (ok, rest) = removed("template < class T > struct A { int x ; } ; int y ;");
        assert!(ok);
        assert_eq!(rest, "int y ;");
    }

    #[test]
    fn test_remove_forward_declaration() {
        let (ok, rest) = removed("template < class T > struct A ; int y ;");
        assert!(ok);
        assert_eq!(rest, "int y ;");
    }

    #[test]
    fn test_remove_keeps_constructor_body() {
        let (ok, rest) = removed("template < class T > A ( T t ) { } int y ;");
        assert!(ok);
        assert_eq!(rest, "A ( T t ) { } int y ;");
    }

    #[test]
    fn test_remove_keeps_explicit_constructor() {
        let (ok, rest) = removed("template < class T > explicit A ( T t ) { } int y ;");
        assert!(ok);
        assert_eq!(rest, "explicit A ( T t ) { } int y ;");
    }

    #[test]
    fn test_remove_garbage_paren() {
        let (ok, rest) = removed("template < class T > struct X ) int y ;");
        assert!(!ok);
        assert_eq!(rest, "int y ;");
    }

    #[test]
    fn test_remove_garbage_brace() {
        let (ok, rest) = removed("template < class T } int y ;");
        assert!(!ok);
        assert_eq!(rest, "} int y ;");
    }

    #[test]
    fn test_remove_nested_template_template_parameter() {
        let (ok, rest) = removed("template < class > class C , int x ;");
        assert!(ok);
        // only the prefix through ">" goes; the rest is left for the parser
        assert_eq!(rest, "class C , int x ;");
    }

    // ── cleanup ─────────────────────────────────────────────

    #[test]
    fn test_cleanup_collapses_spaced_call() {
        let mut list = lex("; f < int , char > ( ) ;");
        cleanup_after_simplify(&mut list);
        assert_eq!(list.to_string(), "; f<int,char> ( ) ;");
    }

    #[test]
    fn test_cleanup_at_stream_head() {
        let mut list = lex("f < int > ( ) ;");
        cleanup_after_simplify(&mut list);
        assert_eq!(list.to_string(), "f<int> ( ) ;");
    }

    #[test]
    fn test_cleanup_strips_specialization_residue() {
        let mut list = lex("x ; template < > foo < int > ; int y ;");
        cleanup_after_simplify(&mut list);
        assert_eq!(list.to_string(), "x ; ; int y ;");
    }

    #[test]
    fn test_cleanup_leaves_ordinary_code() {
        let mut list = lex("; a < b ; f ( x < y ) ;");
        cleanup_after_simplify(&mut list);
        assert_eq!(list.to_string(), "; a < b ; f ( x < y ) ;");
    }

    // ── angle balance check ─────────────────────────────────

    #[test]
    fn test_balanced_angles() {
        let list = lex("std :: vector < int > v ;");
        assert_eq!(unbalanced_angle_token(&list), None);
    }

    #[test]
    fn test_unbalanced_angles_detected() {
        let list = lex("; A < B < int > x ;");
        let bad = unbalanced_angle_token(&list);
        assert!(bad.is_some());
        assert_eq!(list.text(bad.unwrap()), "A");
    }

    #[test]
    fn test_comparison_is_not_unbalanced() {
        let list = lex("int f ( ) { return a < b ; }");
        assert_eq!(unbalanced_angle_token(&list), None);
    }

    #[test]
    fn test_executing_scope_skipped() {
        let list = lex("void f ( ) { x = a < b ; } int g ;");
        assert_eq!(unbalanced_angle_token(&list), None);
    }
}
