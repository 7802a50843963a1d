//! 订单：由 finalize_checkout 工具参数构造，构造后不可变

pub mod finalizer;

use serde::{Deserialize, Serialize};

use crate::core::SalesError;

pub use finalizer::{format_notification, OrderFinalizer};

/// 订单中的一项商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderItem {
    pub product_id: String,
    #[serde(rename = "product_name")]
    pub name: String,
    pub quantity: u32,
    /// 单价，保持模型给出的格式化字符串（如 "R$ 45,00"）
    pub price: String,
    /// 口味等自由文本，可为空
    pub detail: String,
}

/// 支付方式；未知取值保留原文，便于日志排查
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Cash,
    Pix,
    Other(String),
}

impl PaymentMethod {
    pub const DECLARED: [&'static str; 4] = ["credit_card", "debit_card", "cash", "pix"];

    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Other(s) => s,
        }
    }

    /// 给运营方看的名称；未映射的取值渲染为空串
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "Pix",
            PaymentMethod::CreditCard => "Cartão de crédito",
            PaymentMethod::DebitCard => "Cartão de débito",
            PaymentMethod::Cash => "Dinheiro",
            PaymentMethod::Other(_) => "",
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(s: String) -> Self {
        match s.as_str() {
            "credit_card" => PaymentMethod::CreditCard,
            "debit_card" => PaymentMethod::DebitCard,
            "cash" => PaymentMethod::Cash,
            "pix" => PaymentMethod::Pix,
            _ => PaymentMethod::Other(s),
        }
    }
}

impl From<PaymentMethod> for String {
    fn from(m: PaymentMethod) -> Self {
        m.as_str().to_string()
    }
}

/// 已确认的订单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Order {
    #[serde(rename = "products")]
    pub items: Vec<OrderItem>,
    pub total_price: String,
    pub full_name: String,
    pub delivery_address: String,
    pub payment_method: PaymentMethod,
}

impl Order {
    /// 从 JSON 编码的工具参数解析订单；缺字段、类型不符、多余字段都返回 Validation
    pub fn from_tool_arguments(raw: &str) -> Result<Self, SalesError> {
        serde_json::from_str(raw)
            .map_err(|e| SalesError::Validation(format!("invalid order arguments: {e}")))
    }
}
