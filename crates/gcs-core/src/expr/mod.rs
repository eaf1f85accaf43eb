//! Symbolic Expressions
//!
//! Constraint equations are expression trees over parameter references and
//! constants. The solver evaluates them numerically, differentiates them
//! exactly to fill Jacobian rows, freezes parameters of earlier groups into
//! constants and renames parameters during substitution.

mod vector;

pub use vector::{ExprQuaternion, ExprVector};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::handle::ParamId;

/// Source of parameter values during evaluation
pub trait ParamValues {
    /// Current value of `param`
    fn value(&self, param: ParamId) -> f64;
}

impl<F> ParamValues for F
where
    F: Fn(ParamId) -> f64,
{
    fn value(&self, param: ParamId) -> f64 {
        self(param)
    }
}

/// Which parameters an expression depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencedParams {
    /// The expression is constant
    None,
    /// Exactly one parameter appears (possibly several times)
    One(ParamId),
    /// Two or more distinct parameters appear
    Multiple,
}

/// A scalar expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a parameter
    Param(ParamId),
    /// Numeric constant
    Constant(f64),

    // ============== Binary Operators ==============
    Plus(Box<Expr>, Box<Expr>),
    Minus(Box<Expr>, Box<Expr>),
    Times(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),

    // ============== Unary Operators ==============
    Negate(Box<Expr>),
    Sqrt(Box<Expr>),
    Square(Box<Expr>),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
    ASin(Box<Expr>),
    ACos(Box<Expr>),
}

impl Expr {
    /// Reference a parameter
    pub fn param(param: ParamId) -> Self {
        Expr::Param(param)
    }

    /// A numeric constant
    pub fn constant(value: f64) -> Self {
        Expr::Constant(value)
    }

    pub fn sqrt(self) -> Self {
        Expr::Sqrt(Box::new(self))
    }

    pub fn square(self) -> Self {
        Expr::Square(Box::new(self))
    }

    pub fn sin(self) -> Self {
        Expr::Sin(Box::new(self))
    }

    pub fn cos(self) -> Self {
        Expr::Cos(Box::new(self))
    }

    pub fn asin(self) -> Self {
        Expr::ASin(Box::new(self))
    }

    pub fn acos(self) -> Self {
        Expr::ACos(Box::new(self))
    }

    /// Whether this is the constant zero
    pub fn is_zero_const(&self) -> bool {
        matches!(self, Expr::Constant(v) if *v == 0.0)
    }

    /// The constant value, if this node is a constant
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Expr::Constant(v) => Some(*v),
            _ => None,
        }
    }

    /// The parameter, if this node is a bare parameter reference
    pub fn as_param(&self) -> Option<ParamId> {
        match self {
            Expr::Param(p) => Some(*p),
            _ => None,
        }
    }

    /// If this expression has the form `a - b` with both sides bare
    /// parameters, return them.
    pub fn as_param_difference(&self) -> Option<(ParamId, ParamId)> {
        match self {
            Expr::Minus(a, b) => Some((a.as_param()?, b.as_param()?)),
            _ => None,
        }
    }

    /// Number of nodes in the tree
    pub fn nodes(&self) -> usize {
        match self {
            Expr::Param(_) | Expr::Constant(_) => 1,
            Expr::Plus(a, b) | Expr::Minus(a, b) | Expr::Times(a, b) | Expr::Div(a, b) => {
                1 + a.nodes() + b.nodes()
            }
            Expr::Negate(a)
            | Expr::Sqrt(a)
            | Expr::Square(a)
            | Expr::Sin(a)
            | Expr::Cos(a)
            | Expr::ASin(a)
            | Expr::ACos(a) => 1 + a.nodes(),
        }
    }

    /// Evaluate numerically
    pub fn eval<V: ParamValues + ?Sized>(&self, values: &V) -> f64 {
        match self {
            Expr::Param(p) => values.value(*p),
            Expr::Constant(v) => *v,
            Expr::Plus(a, b) => a.eval(values) + b.eval(values),
            Expr::Minus(a, b) => a.eval(values) - b.eval(values),
            Expr::Times(a, b) => a.eval(values) * b.eval(values),
            Expr::Div(a, b) => a.eval(values) / b.eval(values),
            Expr::Negate(a) => -a.eval(values),
            Expr::Sqrt(a) => a.eval(values).sqrt(),
            Expr::Square(a) => {
                let r = a.eval(values);
                r * r
            }
            Expr::Sin(a) => a.eval(values).sin(),
            Expr::Cos(a) => a.eval(values).cos(),
            Expr::ASin(a) => a.eval(values).asin(),
            Expr::ACos(a) => a.eval(values).acos(),
        }
    }

    /// Visit every parameter reference, in tree order
    pub fn visit_params(&self, f: &mut impl FnMut(ParamId)) {
        match self {
            Expr::Param(p) => f(*p),
            Expr::Constant(_) => {}
            Expr::Plus(a, b) | Expr::Minus(a, b) | Expr::Times(a, b) | Expr::Div(a, b) => {
                a.visit_params(f);
                b.visit_params(f);
            }
            Expr::Negate(a)
            | Expr::Sqrt(a)
            | Expr::Square(a)
            | Expr::Sin(a)
            | Expr::Cos(a)
            | Expr::ASin(a)
            | Expr::ACos(a) => a.visit_params(f),
        }
    }

    /// Collect the parameters this expression uses
    pub fn params_used(&self, out: &mut BTreeSet<ParamId>) {
        self.visit_params(&mut |p| {
            out.insert(p);
        });
    }

    /// Whether `param` appears anywhere in the tree
    pub fn depends_on(&self, param: ParamId) -> bool {
        match self {
            Expr::Param(p) => *p == param,
            Expr::Constant(_) => false,
            Expr::Plus(a, b) | Expr::Minus(a, b) | Expr::Times(a, b) | Expr::Div(a, b) => {
                a.depends_on(param) || b.depends_on(param)
            }
            Expr::Negate(a)
            | Expr::Sqrt(a)
            | Expr::Square(a)
            | Expr::Sin(a)
            | Expr::Cos(a)
            | Expr::ASin(a)
            | Expr::ACos(a) => a.depends_on(param),
        }
    }

    /// Classify the parameters referenced by this expression
    pub fn referenced_params(&self) -> ReferencedParams {
        let mut found = ReferencedParams::None;
        self.visit_params(&mut |p| {
            found = match found {
                ReferencedParams::None => ReferencedParams::One(p),
                ReferencedParams::One(q) if q == p => ReferencedParams::One(q),
                _ => ReferencedParams::Multiple,
            };
        });
        found
    }

    /// Exact partial derivative with respect to `param`.
    ///
    /// The result is not simplified; callers normally follow this with
    /// [`Expr::fold_constants`].
    pub fn partial_wrt(&self, param: ParamId) -> Expr {
        if !self.depends_on(param) {
            return Expr::Constant(0.0);
        }
        match self {
            Expr::Param(p) => Expr::Constant(if *p == param { 1.0 } else { 0.0 }),
            Expr::Constant(_) => Expr::Constant(0.0),
            Expr::Plus(a, b) => a.partial_wrt(param) + b.partial_wrt(param),
            Expr::Minus(a, b) => a.partial_wrt(param) - b.partial_wrt(param),
            Expr::Times(a, b) => {
                let da = a.partial_wrt(param);
                let db = b.partial_wrt(param);
                (**a).clone() * db + (**b).clone() * da
            }
            Expr::Div(a, b) => {
                let da = a.partial_wrt(param);
                let db = b.partial_wrt(param);
                (da * (**b).clone() - (**a).clone() * db) / (**b).clone().square()
            }
            Expr::Negate(a) => -a.partial_wrt(param),
            Expr::Sqrt(a) => {
                (Expr::Constant(0.5) / (**a).clone().sqrt()) * a.partial_wrt(param)
            }
            Expr::Square(a) => (Expr::Constant(2.0) * (**a).clone()) * a.partial_wrt(param),
            Expr::Sin(a) => (**a).clone().cos() * a.partial_wrt(param),
            Expr::Cos(a) => -((**a).clone().sin() * a.partial_wrt(param)),
            Expr::ASin(a) => {
                let root = (Expr::Constant(1.0) - (**a).clone().square()).sqrt();
                (Expr::Constant(1.0) / root) * a.partial_wrt(param)
            }
            Expr::ACos(a) => {
                let root = (Expr::Constant(1.0) - (**a).clone().square()).sqrt();
                (Expr::Constant(-1.0) / root) * a.partial_wrt(param)
            }
        }
    }

    /// Simplify constant subtrees.
    ///
    /// Operators whose operands are all constants collapse to a constant;
    /// `x + 0`, `0 + x`, `x * 1` and `1 * x` reduce to `x`, and a product
    /// with a zero constant becomes zero.
    pub fn fold_constants(self) -> Expr {
        match self {
            Expr::Param(_) | Expr::Constant(_) => self,
            Expr::Plus(a, b) => {
                let (a, b) = (a.fold_constants(), b.fold_constants());
                match (a.as_constant(), b.as_constant()) {
                    (Some(x), Some(y)) => Expr::Constant(x + y),
                    (_, Some(y)) if y == 0.0 => a,
                    (Some(x), _) if x == 0.0 => b,
                    _ => a + b,
                }
            }
            Expr::Minus(a, b) => {
                let (a, b) = (a.fold_constants(), b.fold_constants());
                match (a.as_constant(), b.as_constant()) {
                    (Some(x), Some(y)) => Expr::Constant(x - y),
                    _ => a - b,
                }
            }
            Expr::Times(a, b) => {
                let (a, b) = (a.fold_constants(), b.fold_constants());
                match (a.as_constant(), b.as_constant()) {
                    (Some(x), Some(y)) => Expr::Constant(x * y),
                    (_, Some(y)) if y == 1.0 => a,
                    (Some(x), _) if x == 1.0 => b,
                    (_, Some(y)) if y == 0.0 => Expr::Constant(0.0),
                    (Some(x), _) if x == 0.0 => Expr::Constant(0.0),
                    _ => a * b,
                }
            }
            Expr::Div(a, b) => {
                let (a, b) = (a.fold_constants(), b.fold_constants());
                match (a.as_constant(), b.as_constant()) {
                    (Some(x), Some(y)) => Expr::Constant(x / y),
                    _ => a / b,
                }
            }
            Expr::Negate(a) => fold_unary(*a, Expr::Negate, |x| -x),
            Expr::Sqrt(a) => fold_unary(*a, Expr::Sqrt, f64::sqrt),
            Expr::Square(a) => fold_unary(*a, Expr::Square, |x| x * x),
            Expr::Sin(a) => fold_unary(*a, Expr::Sin, f64::sin),
            Expr::Cos(a) => fold_unary(*a, Expr::Cos, f64::cos),
            Expr::ASin(a) => fold_unary(*a, Expr::ASin, f64::asin),
            Expr::ACos(a) => fold_unary(*a, Expr::ACos, f64::acos),
        }
    }

    /// Replace every parameter for which `frozen` returns a value with that
    /// value as a constant.
    pub fn freeze(self, frozen: &impl Fn(ParamId) -> Option<f64>) -> Expr {
        match self {
            Expr::Param(p) => match frozen(p) {
                Some(v) => Expr::Constant(v),
                None => self,
            },
            Expr::Constant(_) => self,
            Expr::Plus(a, b) => a.freeze(frozen) + b.freeze(frozen),
            Expr::Minus(a, b) => a.freeze(frozen) - b.freeze(frozen),
            Expr::Times(a, b) => a.freeze(frozen) * b.freeze(frozen),
            Expr::Div(a, b) => a.freeze(frozen) / b.freeze(frozen),
            Expr::Negate(a) => -a.freeze(frozen),
            Expr::Sqrt(a) => a.freeze(frozen).sqrt(),
            Expr::Square(a) => a.freeze(frozen).square(),
            Expr::Sin(a) => a.freeze(frozen).sin(),
            Expr::Cos(a) => a.freeze(frozen).cos(),
            Expr::ASin(a) => a.freeze(frozen).asin(),
            Expr::ACos(a) => a.freeze(frozen).acos(),
        }
    }

    /// Rename parameters in place according to `map`
    pub fn substitute(&mut self, map: &BTreeMap<ParamId, ParamId>) {
        match self {
            Expr::Param(p) => {
                if let Some(by) = map.get(p) {
                    *p = *by;
                }
            }
            Expr::Constant(_) => {}
            Expr::Plus(a, b) | Expr::Minus(a, b) | Expr::Times(a, b) | Expr::Div(a, b) => {
                a.substitute(map);
                b.substitute(map);
            }
            Expr::Negate(a)
            | Expr::Sqrt(a)
            | Expr::Square(a)
            | Expr::Sin(a)
            | Expr::Cos(a)
            | Expr::ASin(a)
            | Expr::ACos(a) => a.substitute(map),
        }
    }
}

fn fold_unary(a: Expr, rebuild: fn(Box<Expr>) -> Expr, apply: fn(f64) -> f64) -> Expr {
    let a = a.fold_constants();
    match a.as_constant() {
        Some(x) => Expr::Constant(apply(x)),
        None => rebuild(Box::new(a)),
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Constant(value)
    }
}

impl From<ParamId> for Expr {
    fn from(param: ParamId) -> Self {
        Expr::Param(param)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Plus(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Minus(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Times(Box::new(self), Box::new(rhs))
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Negate(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(p) => write!(f, "{p}"),
            Expr::Constant(v) => write!(f, "{v}"),
            Expr::Plus(a, b) => write!(f, "({a} + {b})"),
            Expr::Minus(a, b) => write!(f, "({a} - {b})"),
            Expr::Times(a, b) => write!(f, "({a} * {b})"),
            Expr::Div(a, b) => write!(f, "({a} / {b})"),
            Expr::Negate(a) => write!(f, "(-{a})"),
            Expr::Sqrt(a) => write!(f, "sqrt({a})"),
            Expr::Square(a) => write!(f, "square({a})"),
            Expr::Sin(a) => write!(f, "sin({a})"),
            Expr::Cos(a) => write!(f, "cos({a})"),
            Expr::ASin(a) => write!(f, "asin({a})"),
            Expr::ACos(a) => write!(f, "acos({a})"),
        }
    }
}
