//! Expression AST and reduction algebra (C2).
//!
//! An `Expression` is an immutable, reference-counted tree. The only public
//! mutators are compositional (`and`, `or`, `negate`, ...) and every one of
//! them returns a fully reduced expression: reduction is applied by the
//! smart constructors themselves, not as a separate pass, so a tree built
//! exclusively through this API is always at its reduction fixed point.
//!
//! Equality, ordering, and hashing are all defined over the canonical
//! `literal()` string form (see `serializer.rs`). This gives us, for free,
//! the total order spec §3 requires for sorting file groups and
//! transformations deterministically, and sidesteps having to hand-write a
//! structural comparator that also has to special-case commutative operand
//! order.

use crate::value::{CoerceError, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use thiserror::Error;

/// Binary, boolean-valued comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op2 {
    Eq,
    Ne,
    Contains,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op2 {
    /// Operators allowed on CONDITION nodes (spec §4.2).
    pub fn condition_compatible(self) -> bool {
        matches!(self, Op2::Eq | Op2::Ne | Op2::Contains)
    }

    fn symbol(self) -> &'static str {
        match self {
            Op2::Eq => "==",
            Op2::Ne => "!=",
            Op2::Contains => "contains",
            Op2::Gt => ">",
            Op2::Ge => ">=",
            Op2::Lt => "<",
            Op2::Le => "<=",
        }
    }
}

/// Unary, value-valued coercion operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op1 {
    AsInt,
    AsList,
    AsString,
    Sizeof,
}

impl Op1 {
    fn name(self) -> &'static str {
        match self {
            Op1::AsInt => "as_int",
            Op1::AsList => "as_list",
            Op1::AsString => "as_string",
            Op1::Sizeof => "sizeof",
        }
    }
}

/// The operator/token kinds that can appear in a reduced expression, used
/// by the validator to check CONDITION operator compatibility (§4.2, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Contains,
    Gt,
    Ge,
    Lt,
    Le,
    AsInt,
    AsList,
    AsString,
    Sizeof,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unresolved variable '{0}'")]
    UnresolvedVariable(String),
    #[error("type error: {0}")]
    TypeError(#[from] CoerceError),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

#[derive(Debug)]
enum ExprNode {
    Lit(Value),
    Var(String),
    Not(Expression),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Binary(Op2, Expression, Expression),
    Unary(Op1, Expression),
}

/// A reduced boolean/value expression. Cheap to clone (reference-counted).
#[derive(Clone)]
pub struct Expression(Rc<ExprNode>);

pub static TRUE: Lazy<Expression> = Lazy::new(|| Expression::lit(Value::Boolean(true)));
pub static FALSE: Lazy<Expression> = Lazy::new(|| Expression::lit(Value::Boolean(false)));

impl Expression {
    fn new(node: ExprNode) -> Self {
        Expression(Rc::new(node))
    }

    fn lit(v: Value) -> Self {
        Expression::new(ExprNode::Lit(v))
    }

    pub fn literal_value(v: Value) -> Self {
        Expression::lit(v)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expression::new(ExprNode::Var(name.into()))
    }

    pub fn is_true(&self) -> bool {
        *self == *TRUE
    }

    pub fn is_false(&self) -> bool {
        *self == *FALSE
    }

    fn as_lit(&self) -> Option<&Value> {
        match &*self.0 {
            ExprNode::Lit(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this subtree mentions no variables (hence can be
    /// constant-folded eagerly by the smart constructors).
    fn is_closed(&self) -> bool {
        self.variables().is_empty()
    }

    // ---- compositional mutators -------------------------------------

    pub fn negate(&self) -> Expression {
        if self.is_true() {
            return FALSE.clone();
        }
        if self.is_false() {
            return TRUE.clone();
        }
        match &*self.0 {
            ExprNode::Not(inner) => inner.clone(),
            ExprNode::Binary(Op2::Eq, a, b) => {
                Expression::new(ExprNode::Binary(Op2::Ne, a.clone(), b.clone()))
            }
            ExprNode::Binary(Op2::Ne, a, b) => {
                Expression::new(ExprNode::Binary(Op2::Eq, a.clone(), b.clone()))
            }
            ExprNode::And(list) => {
                // De Morgan: !(a && b) == !a || !b. Only adopt it when it
                // does not grow the token count (e.g. every child is
                // already a negation, so negating cancels).
                let demorgan = Self::or_all(list.iter().map(|c| c.negate()).collect());
                let plain = Expression::new(ExprNode::Not(self.clone()));
                if demorgan.token_count() <= plain.token_count() {
                    demorgan
                } else {
                    plain
                }
            }
            ExprNode::Or(list) => {
                let demorgan = Self::and_all(list.iter().map(|c| c.negate()).collect());
                let plain = Expression::new(ExprNode::Not(self.clone()));
                if demorgan.token_count() <= plain.token_count() {
                    demorgan
                } else {
                    plain
                }
            }
            _ => Expression::new(ExprNode::Not(self.clone())),
        }
    }

    pub fn and(&self, other: &Expression) -> Expression {
        Self::and_all(vec![self.clone(), other.clone()])
    }

    pub fn or(&self, other: &Expression) -> Expression {
        Self::or_all(vec![self.clone(), other.clone()])
    }

    /// Flatten, dedupe, contradiction-check, and canonically sort a set of
    /// conjuncts. Used both by `and()` and by callers (dedup, stubs) that
    /// build a conjunction from an arbitrary-length list.
    pub fn and_all(parts: Vec<Expression>) -> Expression {
        let mut flat: Vec<Expression> = Vec::new();
        for p in parts {
            if p.is_false() {
                return FALSE.clone();
            }
            if p.is_true() {
                continue;
            }
            match &*p.0 {
                ExprNode::And(children) => flat.extend(children.iter().cloned()),
                _ => flat.push(p),
            }
        }
        flat.sort_by(cmp_expr);
        flat.dedup_by(|a, b| a == b);
        for i in 0..flat.len() {
            for j in 0..flat.len() {
                if i != j && flat[i] == flat[j].negate() {
                    return FALSE.clone();
                }
            }
        }
        match flat.len() {
            0 => TRUE.clone(),
            1 => flat.into_iter().next().unwrap(),
            _ => Expression::new(ExprNode::And(flat)),
        }
    }

    pub fn or_all(parts: Vec<Expression>) -> Expression {
        let mut flat: Vec<Expression> = Vec::new();
        for p in parts {
            if p.is_true() {
                return TRUE.clone();
            }
            if p.is_false() {
                continue;
            }
            match &*p.0 {
                ExprNode::Or(children) => flat.extend(children.iter().cloned()),
                _ => flat.push(p),
            }
        }
        flat.sort_by(cmp_expr);
        flat.dedup_by(|a, b| a == b);
        for i in 0..flat.len() {
            for j in 0..flat.len() {
                if i != j && flat[i] == flat[j].negate() {
                    return TRUE.clone();
                }
            }
        }
        match flat.len() {
            0 => FALSE.clone(),
            1 => flat.into_iter().next().unwrap(),
            _ => Expression::new(ExprNode::Or(flat)),
        }
    }

    pub fn binary(op: Op2, a: Expression, b: Expression) -> Result<Expression, EvalError> {
        if a.is_closed() && b.is_closed() {
            let av = a.eval_value(&|_: &str| None)?;
            let bv = b.eval_value(&|_: &str| None)?;
            let result = Self::apply_binary(op, &av, &bv)?;
            return Ok(Expression::lit(Value::Boolean(result)));
        }
        Ok(Expression::new(ExprNode::Binary(op, a, b)))
    }

    pub fn unary(op: Op1, a: Expression) -> Result<Expression, EvalError> {
        if a.is_closed() {
            let av = a.eval_value(&|_: &str| None)?;
            let result = Self::apply_unary(op, &av)?;
            return Ok(Expression::lit(result));
        }
        Ok(Expression::new(ExprNode::Unary(op, a)))
    }

    fn apply_binary(op: Op2, a: &Value, b: &Value) -> Result<bool, EvalError> {
        Ok(match op {
            Op2::Eq => a == b,
            Op2::Ne => a != b,
            Op2::Contains => a.as_list()?.contains(&b.as_string()?),
            Op2::Gt => a.as_int()? > b.as_int()?,
            Op2::Ge => a.as_int()? >= b.as_int()?,
            Op2::Lt => a.as_int()? < b.as_int()?,
            Op2::Le => a.as_int()? <= b.as_int()?,
        })
    }

    fn apply_unary(op: Op1, a: &Value) -> Result<Value, EvalError> {
        Ok(match op {
            Op1::AsInt => Value::of_string(a.as_int()?.to_string()),
            Op1::AsList => Value::of_list(a.as_list()?),
            Op1::AsString => Value::of_string(a.as_string()?),
            Op1::Sizeof => Value::of_string(a.size()?.to_string()),
        })
    }

    // ---- inline / substitution ----------------------------------------

    /// Substitute known variables with literal values, rebuilding bottom-up
    /// through the smart constructors so the result is re-reduced at every
    /// level. Unknown variables remain as variable tokens.
    pub fn inline(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<Expression, EvalError> {
        match &*self.0 {
            ExprNode::Lit(_) => Ok(self.clone()),
            ExprNode::Var(name) => match lookup(name) {
                Some(v) => Ok(Expression::lit(v)),
                None => Ok(self.clone()),
            },
            ExprNode::Not(inner) => Ok(inner.inline(lookup)?.negate()),
            ExprNode::And(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for c in children {
                    parts.push(c.inline(lookup)?);
                }
                Ok(Self::and_all(parts))
            }
            ExprNode::Or(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for c in children {
                    parts.push(c.inline(lookup)?);
                }
                Ok(Self::or_all(parts))
            }
            ExprNode::Binary(op, a, b) => {
                let a2 = a.inline(lookup)?;
                let b2 = b.inline(lookup)?;
                Self::binary(*op, a2, b2)
            }
            ExprNode::Unary(op, a) => {
                let a2 = a.inline(lookup)?;
                Self::unary(*op, a2)
            }
        }
    }

    /// Simplify `self` under the assumption that `antecedent` holds:
    /// entailed terms collapse to TRUE, contradicted terms to FALSE.
    pub fn relativize(&self, antecedent: &Expression) -> Expression {
        if antecedent.is_true() {
            return self.clone();
        }
        if self == antecedent {
            return TRUE.clone();
        }
        if *self == antecedent.negate() {
            return FALSE.clone();
        }
        match &*self.0 {
            ExprNode::Not(inner) => inner.relativize(antecedent).negate(),
            ExprNode::And(children) => {
                Self::and_all(children.iter().map(|c| c.relativize(antecedent)).collect())
            }
            ExprNode::Or(children) => {
                Self::or_all(children.iter().map(|c| c.relativize(antecedent)).collect())
            }
            _ => {
                let bindings = antecedent.equality_bindings();
                if bindings.is_empty() {
                    self.clone()
                } else {
                    self.inline(&|name| {
                        bindings
                            .iter()
                            .find(|(n, _)| n == name)
                            .map(|(_, v)| v.clone())
                    })
                    .unwrap_or_else(|_| self.clone())
                }
            }
        }
    }

    /// Extract `(variable, value)` facts implied directly by this
    /// expression's top-level conjunction: `${x}=='v'` binds `x`; a bare
    /// `${x}` binds `x` to `true`; `!${x}` binds `x` to `false`.
    fn equality_bindings(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings(&self, out: &mut Vec<(String, Value)>) {
        match &*self.0 {
            ExprNode::And(children) => {
                for c in children {
                    c.collect_bindings(out);
                }
            }
            ExprNode::Binary(Op2::Eq, a, b) => {
                if let (ExprNode::Var(name), Some(v)) = (&*a.0, b.as_lit()) {
                    out.push((name.clone(), v.clone()));
                } else if let (Some(v), ExprNode::Var(name)) = (a.as_lit(), &*b.0) {
                    out.push((name.clone(), v.clone()));
                }
            }
            ExprNode::Var(name) => out.push((name.clone(), Value::Boolean(true))),
            ExprNode::Not(inner) => {
                if let ExprNode::Var(name) = &*inner.0 {
                    out.push((name.clone(), Value::Boolean(false)));
                }
            }
            _ => {}
        }
    }

    /// The set of variable names appearing in this (reduced) expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match &*self.0 {
            ExprNode::Lit(_) => {}
            ExprNode::Var(name) => {
                out.insert(name.clone());
            }
            ExprNode::Not(inner) | ExprNode::Unary(_, inner) => inner.collect_variables(out),
            ExprNode::And(children) | ExprNode::Or(children) => {
                for c in children {
                    c.collect_variables(out);
                }
            }
            ExprNode::Binary(_, a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }

    /// The operator kinds appearing in this expression, for validator
    /// operator-compatibility checks (§4.2, §4.7).
    pub fn tokens(&self) -> BTreeSet<OpKind> {
        let mut out = BTreeSet::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens(&self, out: &mut BTreeSet<OpKind>) {
        match &*self.0 {
            ExprNode::Lit(_) | ExprNode::Var(_) => {}
            ExprNode::Not(inner) => {
                out.insert(OpKind::Not);
                inner.collect_tokens(out);
            }
            ExprNode::And(children) => {
                out.insert(OpKind::And);
                for c in children {
                    c.collect_tokens(out);
                }
            }
            ExprNode::Or(children) => {
                out.insert(OpKind::Or);
                for c in children {
                    c.collect_tokens(out);
                }
            }
            ExprNode::Binary(op, a, b) => {
                out.insert(match op {
                    Op2::Eq => OpKind::Eq,
                    Op2::Ne => OpKind::Ne,
                    Op2::Contains => OpKind::Contains,
                    Op2::Gt => OpKind::Gt,
                    Op2::Ge => OpKind::Ge,
                    Op2::Lt => OpKind::Lt,
                    Op2::Le => OpKind::Le,
                });
                a.collect_tokens(out);
                b.collect_tokens(out);
            }
            ExprNode::Unary(op, a) => {
                out.insert(match op {
                    Op1::AsInt => OpKind::AsInt,
                    Op1::AsList => OpKind::AsList,
                    Op1::AsString => OpKind::AsString,
                    Op1::Sizeof => OpKind::Sizeof,
                });
                a.collect_tokens(out);
            }
        }
    }

    fn token_count(&self) -> usize {
        match &*self.0 {
            ExprNode::Lit(_) | ExprNode::Var(_) => 1,
            ExprNode::Not(inner) | ExprNode::Unary(_, inner) => 1 + inner.token_count(),
            ExprNode::And(children) | ExprNode::Or(children) => {
                1 + children.iter().map(|c| c.token_count()).sum::<usize>()
            }
            ExprNode::Binary(_, a, b) => 1 + a.token_count() + b.token_count(),
        }
    }

    /// Full evaluation to a boolean.
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<bool, EvalError> {
        self.eval_value(lookup)?
            .as_bool()
            .map_err(EvalError::TypeError)
    }

    fn eval_value(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<Value, EvalError> {
        match &*self.0 {
            ExprNode::Lit(v) => Ok(v.clone()),
            ExprNode::Var(name) => {
                lookup(name).ok_or_else(|| EvalError::UnresolvedVariable(name.clone()))
            }
            ExprNode::Not(inner) => Ok(Value::Boolean(!inner.eval(lookup)?)),
            ExprNode::And(children) => {
                for c in children {
                    if !c.eval(lookup)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            ExprNode::Or(children) => {
                for c in children {
                    if c.eval(lookup)? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            ExprNode::Binary(op, a, b) => {
                let av = a.eval_value(lookup)?;
                let bv = b.eval_value(lookup)?;
                Ok(Value::Boolean(Self::apply_binary(*op, &av, &bv)?))
            }
            ExprNode::Unary(op, a) => {
                let av = a.eval_value(lookup)?;
                Self::apply_unary(*op, &av)
            }
        }
    }

    /// Canonical string form (see `serializer::serialize`).
    pub fn literal(&self) -> String {
        match &*self.0 {
            ExprNode::Lit(Value::Boolean(true)) => "true".to_string(),
            ExprNode::Lit(Value::Boolean(false)) => "false".to_string(),
            ExprNode::Lit(Value::Text(s)) | ExprNode::Lit(Value::Dynamic(s)) => {
                format!("'{}'", s.replace('\'', "\\'"))
            }
            ExprNode::Lit(Value::List(items)) => format!("[{}]", items.join(",")),
            ExprNode::Lit(Value::TypedEmpty(k)) => format!("<empty:{}>", k),
            ExprNode::Lit(Value::Empty) => "<empty>".to_string(),
            ExprNode::Var(name) => format!("${{{}}}", name),
            ExprNode::Not(inner) => format!("!({})", inner.literal()),
            ExprNode::And(children) => children
                .iter()
                .map(|c| c.literal())
                .collect::<Vec<_>>()
                .join(" && "),
            ExprNode::Or(children) => format!(
                "({})",
                children
                    .iter()
                    .map(|c| c.literal())
                    .collect::<Vec<_>>()
                    .join(" || ")
            ),
            ExprNode::Binary(op, a, b) => {
                format!("{} {} {}", a.literal(), op.symbol(), b.literal())
            }
            ExprNode::Unary(op, a) => format!("{}({})", op.name(), a.literal()),
        }
    }
}

fn cmp_expr(a: &Expression, b: &Expression) -> Ordering {
    a.literal().cmp(&b.literal())
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.literal() == other.literal()
    }
}

impl Eq for Expression {}

impl PartialOrd for Expression {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expression {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_expr(self, other)
    }
}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.literal().hash(state);
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({})", self.literal())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal())
    }
}
