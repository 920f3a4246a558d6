//! Status reporting for deployed programs and staging buffers.

use std::fmt;

use comfy_table::{Cell, Table, presets::UTF8_FULL};

use crate::gateway::{AccountId, BufferInfo, ChainGateway, GatewayError};

/// Snapshot of a program account for operator inspection.
pub struct ProgramStatus {
    pub program: AccountId,
    pub exists: bool,
    pub capacity: u64,
    pub content_hash: Option<String>,
}

/// Query the current status of a program account.
pub async fn program_status<G: ChainGateway>(
    gateway: &G,
    program: &AccountId,
) -> Result<ProgramStatus, GatewayError> {
    let info = gateway.get_account_info(program).await?;
    Ok(ProgramStatus {
        program: program.clone(),
        exists: info.exists,
        capacity: info.capacity,
        content_hash: info.content_hash,
    })
}

/// Render an authority's open staging buffers as a table.
///
/// Open buffers after all attempts have terminated indicate leaked cleanup;
/// closing them recovers their balance.
pub fn render_buffers(authority: &AccountId, buffers: &[BufferInfo]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["buffer account", "capacity (bytes)", "authority"]);

    for buffer in buffers {
        table.add_row(vec![
            Cell::new(buffer.account.as_str()),
            Cell::new(buffer.capacity),
            Cell::new(authority.as_str()),
        ]);
    }

    table
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = status_icon(self.exists);
        write!(f, "{} {} ", status, self.program)?;

        if self.exists {
            write!(f, "capacity={}", self.capacity)?;
            if let Some(hash) = &self.content_hash {
                write!(f, " content=sha256:{}", hash)?;
            } else {
                write!(f, " content=<no hash exposed>")?;
            }
        }

        Ok(())
    }
}

fn status_icon(exists: bool) -> &'static str {
    if exists { "[ok]" } else { "[MISSING]" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_existing_program() {
        let status = ProgramStatus {
            program: AccountId::new("prog-1"),
            exists: true,
            capacity: 20_000,
            content_hash: Some("abc123".to_string()),
        };
        let rendered = status.to_string();
        assert!(rendered.contains("[ok]"));
        assert!(rendered.contains("capacity=20000"));
        assert!(rendered.contains("sha256:abc123"));
    }

    #[test]
    fn test_display_missing_program() {
        let status = ProgramStatus {
            program: AccountId::new("prog-2"),
            exists: false,
            capacity: 0,
            content_hash: None,
        };
        let rendered = status.to_string();
        assert!(rendered.contains("[MISSING]"));
        assert!(!rendered.contains("capacity="));
    }

    #[test]
    fn test_render_buffers_rows() {
        let authority = AccountId::new("auth");
        let buffers = vec![
            BufferInfo {
                account: AccountId::new("buffer-1"),
                capacity: 1024,
            },
            BufferInfo {
                account: AccountId::new("buffer-2"),
                capacity: 2048,
            },
        ];

        let table = render_buffers(&authority, &buffers);
        let rendered = table.to_string();
        assert!(rendered.contains("buffer-1"));
        assert!(rendered.contains("buffer-2"));
        assert!(rendered.contains("2048"));
    }
}
