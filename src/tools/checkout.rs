//! finalize_checkout：解析订单、通知运营方、按需转发支付凭证

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::AgentComponents;
use crate::conversation::{Conversation, PendingToolCall};
use crate::core::SalesError;
use crate::order::{OrderFinalizer, PaymentMethod};
use crate::tools::{ToolEffect, ToolExecution, ToolHandler, ToolKind};

const ORDER_RECEIVED: &str = "pedido recebido, aguardando comprovante";

pub struct FinalizeCheckoutTool {
    finalizer: OrderFinalizer,
}

impl FinalizeCheckoutTool {
    pub fn new(finalizer: OrderFinalizer) -> Self {
        Self { finalizer }
    }
}

#[async_trait]
impl ToolHandler for FinalizeCheckoutTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FinalizeCheckout
    }

    fn description(&self) -> &str {
        "Deve ser chamado após finalizar a escolha dos produtos e uma forma de pagamento. \
         Ou seja, assim que você retornar a mensagem \"Pedido confirmado\". \
         Não precisa validar o comprovante pix para chamar esta função"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["products", "total_price", "full_name", "delivery_address", "payment_method"],
            "properties": {
                "products": {
                    "type": "array",
                    "description": "Lista de produtos no carrinho",
                    "items": {
                        "type": "object",
                        "properties": {
                            "product_id": { "type": "string", "description": "Identificador único do produto" },
                            "product_name": { "type": "string", "description": "Nome do produto" },
                            "quantity": { "type": "integer", "description": "Quantidade do produto" },
                            "price": { "type": "string", "description": "Preço unitário do produto" },
                            "detail": { "type": "string", "description": "Sabor e qualquer outro detalhe acrescentado durante a conversa" }
                        },
                        "required": ["product_id", "product_name", "quantity", "price", "detail"],
                        "additionalProperties": false
                    }
                },
                "total_price": { "type": "string", "description": "Valor total da compra, somando todos os produtos" },
                "full_name": { "type": "string", "description": "Nome completo do usuário" },
                "delivery_address": { "type": "string", "description": "Endereço de entrega dos produtos" },
                "payment_method": {
                    "type": "string",
                    "description": "A forma de pagamento escolhida pelo usuário",
                    "enum": PaymentMethod::DECLARED
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        _components: &AgentComponents,
        conversation: &mut Conversation,
        call: &PendingToolCall,
    ) -> Result<ToolExecution, SalesError> {
        let order = conversation
            .extract_order(&call.arguments)
            .map_err(|e| SalesError::ProtocolViolation {
                tool: call.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(ToolExecution {
            result_text: ORDER_RECEIVED.to_string(),
            order: Some(order),
        })
    }

    async fn after_followup(
        &self,
        components: &AgentComponents,
        conversation: &mut Conversation,
        execution: ToolExecution,
    ) -> Result<ToolEffect, SalesError> {
        let Some(order) = execution.order else {
            return Err(SalesError::ProtocolViolation {
                tool: self.kind().name().to_string(),
                reason: "checkout executed without an order".to_string(),
            });
        };
        conversation.cache_full_name(order.full_name.clone());
        let report = self.finalizer.finalize(components, conversation, &order).await?;
        tracing::info!(
            customer = %conversation.address,
            total = %order.total_price,
            payment = order.payment_method.as_str(),
            receipt_forwarded = report.receipt_forwarded,
            "order finalized"
        );
        conversation.set_order(order);
        Ok(ToolEffect { archive: true })
    }
}
