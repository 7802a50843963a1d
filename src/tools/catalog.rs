//! send_catalog：把目录 PDF 发给客户

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::agent::AgentComponents;
use crate::conversation::{Conversation, MediaKind, PendingToolCall};
use crate::core::SalesError;
use crate::integrations::OutboundMedia;
use crate::tools::{ToolEffect, ToolExecution, ToolHandler, ToolKind};

pub const CATALOG_FILE_NAME: &str = "Catálogo.pdf";
pub const CATALOG_MIME_TYPE: &str = "application/pdf";
const CATALOG_SENT: &str = "catálogo enviado";

pub struct SendCatalogTool {
    /// 启动时编码一次
    catalog_base64: String,
}

impl SendCatalogTool {
    pub fn new(catalog: &[u8]) -> Self {
        Self {
            catalog_base64: STANDARD.encode(catalog),
        }
    }
}

#[async_trait]
impl ToolHandler for SendCatalogTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SendCatalog
    }

    fn description(&self) -> &str {
        "Enviar o catálogo para o usuário quando pedido. Deverá ser chamado quando o usuário pedir o catálogo."
    }

    async fn execute(
        &self,
        components: &AgentComponents,
        conversation: &mut Conversation,
        _call: &PendingToolCall,
    ) -> Result<ToolExecution, SalesError> {
        components
            .send_media(&OutboundMedia {
                recipient: conversation.address.clone(),
                mime_type: CATALOG_MIME_TYPE.to_string(),
                media_kind: MediaKind::Document,
                file_name: CATALOG_FILE_NAME.to_string(),
                base64: self.catalog_base64.clone(),
            })
            .await?;
        Ok(ToolExecution::result(CATALOG_SENT))
    }

    async fn after_followup(
        &self,
        _components: &AgentComponents,
        conversation: &mut Conversation,
        _execution: ToolExecution,
    ) -> Result<ToolEffect, SalesError> {
        conversation.set_allow_receipt_forward(true);
        Ok(ToolEffect::default())
    }
}
