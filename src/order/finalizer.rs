//! 订单收尾：给运营方发订单通知；Pix 订单额外转发最近收到的支付凭证

use crate::agent::AgentComponents;
use crate::conversation::Conversation;
use crate::core::SalesError;
use crate::integrations::OutboundMedia;
use crate::order::{Order, PaymentMethod};

/// 收尾产生的副作用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub notified: bool,
    pub receipt_forwarded: bool,
}

pub struct OrderFinalizer {
    operator_number: String,
}

impl OrderFinalizer {
    pub fn new(operator_number: impl Into<String>) -> Self {
        Self {
            operator_number: operator_number.into(),
        }
    }

    pub fn operator_number(&self) -> &str {
        &self.operator_number
    }

    pub async fn finalize(
        &self,
        components: &AgentComponents,
        conversation: &mut Conversation,
        order: &Order,
    ) -> Result<FinalizeReport, SalesError> {
        let mut report = FinalizeReport::default();

        let notification = format_notification(order, &conversation.address);
        components
            .send_text(&self.operator_number, &notification)
            .await?;
        report.notified = true;

        if order.payment_method == PaymentMethod::Pix {
            match conversation.take_last_attachment() {
                Some(receipt) => {
                    components
                        .send_media(&OutboundMedia {
                            recipient: self.operator_number.clone(),
                            mime_type: receipt.mime_type,
                            media_kind: receipt.media_kind,
                            file_name: format!("Comprovante de {}", order.full_name),
                            base64: receipt.base64,
                        })
                        .await?;
                    report.receipt_forwarded = true;
                }
                None => tracing::warn!(
                    customer = %conversation.address,
                    "pix order finalized without a received receipt"
                ),
            }
        }

        Ok(report)
    }
}

/// 单个商品行：`数量 名称 (细节), 单价`，细节为空时省略括号
pub fn format_item_line(quantity: u32, name: &str, detail: &str, price: &str) -> String {
    if detail.is_empty() {
        format!("{quantity} {name}, {price}")
    } else {
        format!("{quantity} {name} ({detail}), {price}")
    }
}

/// 运营方通知正文
pub fn format_notification(order: &Order, customer_address: &str) -> String {
    let lines: Vec<String> = order
        .items
        .iter()
        .map(|i| format_item_line(i.quantity, &i.name, &i.detail, &i.price))
        .collect();
    format!(
        "Pedido de {} no valor total de {}\n\n{}\n\nEndereço de entrega: {}\nForma de pagamento: {}\nhttps://wa.me/{}",
        order.full_name,
        order.total_price,
        lines.join("\n"),
        order.delivery_address,
        order.payment_method.label(),
        customer_address,
    )
}
