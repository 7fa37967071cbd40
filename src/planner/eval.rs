//! Expression Evaluator
//!
//! Evaluates IR expressions against the current scope chain. Equality is
//! value-equality with exact i64 integers; ordering operators require
//! integer operands; `&&`/`||` short-circuit over truthiness.

use crate::ir::types::{BinaryOperator, Expression};
use crate::ir::value::Value;
use crate::planner::errors::PlanError;
use crate::planner::registry::DecoratorRegistry;
use crate::scope::ScopeGraph;
use crate::vault::Vault;

pub struct Evaluator<'a> {
    pub scopes: &'a ScopeGraph,
    pub vault: &'a Vault,
    pub registry: &'a DecoratorRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(scopes: &'a ScopeGraph, vault: &'a Vault, registry: &'a DecoratorRegistry) -> Self {
        Self { scopes, vault, registry }
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value, PlanError> {
        match expr {
            Expression::Literal(e) => Ok(e.value.clone()),
            Expression::VarRef(e) => Ok(self.scopes.resolve(&e.name)?.value.clone()),
            Expression::EnumMemberRef(e) => {
                let qualified = format!("{}.{}", e.enum_name, e.member);
                self.scopes.resolve(&qualified).map(|b| b.value.clone()).map_err(|err| {
                    match err {
                        crate::scope::ScopeError::Unresolved(_) => PlanError::UnresolvedEnumMember {
                            enum_name: e.enum_name.clone(),
                            member: e.member.clone(),
                        },
                        other => other.into(),
                    }
                })
            }
            Expression::DecoratorRef(e) => {
                // Resolution stores provider values in the vault under the
                // captured expr id; read back rather than re-invoking the
                // provider.
                if let Some(binding) = &e.binding {
                    if let Some(value) = self.vault.value(binding) {
                        return Ok(value.clone());
                    }
                }
                let Some(decorator) = self.registry.get(&e.name) else {
                    return Err(PlanError::NotAValueProvider(e.name.clone()));
                };
                match decorator.resolve_value(&e.path, &self.scopes.as_map()) {
                    Some(result) => result,
                    None => Err(PlanError::NotAValueProvider(e.name.clone())),
                }
            }
            Expression::BinaryOp(e) => {
                match e.op {
                    BinaryOperator::And => {
                        let left = self.evaluate(&e.left)?;
                        if !left.is_truthy() {
                            return Ok(Value::Bool(false));
                        }
                        let right = self.evaluate(&e.right)?;
                        Ok(Value::Bool(right.is_truthy()))
                    }
                    BinaryOperator::Or => {
                        let left = self.evaluate(&e.left)?;
                        if left.is_truthy() {
                            return Ok(Value::Bool(true));
                        }
                        let right = self.evaluate(&e.right)?;
                        Ok(Value::Bool(right.is_truthy()))
                    }
                    BinaryOperator::Eq => {
                        let left = self.evaluate(&e.left)?;
                        let right = self.evaluate(&e.right)?;
                        Ok(Value::Bool(left == right))
                    }
                    BinaryOperator::Ne => {
                        let left = self.evaluate(&e.left)?;
                        let right = self.evaluate(&e.right)?;
                        Ok(Value::Bool(left != right))
                    }
                    BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge => {
                        let left = self.evaluate(&e.left)?;
                        let right = self.evaluate(&e.right)?;
                        let (Some(l), Some(r)) = (left.as_int(), right.as_int()) else {
                            return Err(PlanError::OrderingOperands {
                                left: left.type_name(),
                                right: right.type_name(),
                            });
                        };
                        Ok(Value::Bool(match e.op {
                            BinaryOperator::Lt => l < r,
                            BinaryOperator::Le => l <= r,
                            BinaryOperator::Gt => l > r,
                            BinaryOperator::Ge => l >= r,
                            _ => unreachable!(),
                        }))
                    }
                }
            }
            Expression::TypeCast(e) => {
                let inner = self.evaluate(&e.inner)?;
                self.cast(inner, &e.target, e.optional)
            }
            Expression::Command(e) => {
                // A command expression in value position is an interpolated
                // string: evaluate each part and concatenate renderings.
                let mut out = String::new();
                for part in &e.parts {
                    out.push_str(&self.evaluate(part)?.to_string());
                }
                Ok(Value::Str(out))
            }
        }
    }

    fn cast(&self, value: Value, target: &str, optional: bool) -> Result<Value, PlanError> {
        if value.is_null() {
            return if optional {
                Ok(Value::Null)
            } else {
                Err(PlanError::CastNone(target.to_string()))
            };
        }
        match target {
            "Int" => match &value {
                Value::Int(_) => Ok(value),
                Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    PlanError::Cast { value_type: "string", target: target.to_string() }
                }),
                other => Err(PlanError::Cast {
                    value_type: other.type_name(),
                    target: target.to_string(),
                }),
            },
            "String" => Ok(Value::Str(value.to_string())),
            // Object normalises heterogeneous map-of-string payloads into
            // map-of-any; the Value map already is one.
            "Object" => match value {
                Value::Map(m) => Ok(Value::Map(m)),
                other => Err(PlanError::Cast {
                    value_type: other.type_name(),
                    target: target.to_string(),
                }),
            },
            other => Err(PlanError::UnknownCastTarget(other.to_string())),
        }
    }
}
