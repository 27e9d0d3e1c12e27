//! Prompt construction for LLM requests.

use crate::db::Provider;
use crate::llm::types::Message;

/// System prompt template for the database assistant.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a database assistant connected to a {provider} database ({dialect} dialect). Answer the user's questions about their data.

TOOLS:
- list_tables: list the tables in the database
- get_table_schema(table_name): columns, types and nullability of one table
- execute_sql_query(query): run a SQL query and return the rows as JSON

INSTRUCTIONS:
- Verify table names with list_tables before querying
- Check column names with get_table_schema when unsure
- Only read data: never run INSERT, UPDATE, DELETE, DROP, ALTER or TRUNCATE
- Keep result sets small; use LIMIT unless the user asks for everything
- If a tool returns an error, explain it or adjust the query
- Answer in plain language and mention the query you ran when it helps"#;

/// Builds the system prompt for a connection to `provider`.
pub fn build_system_prompt(provider: Provider) -> String {
    let dialect = match provider {
        Provider::MySql => "MySQL",
        Provider::Postgres | Provider::Supabase => "PostgreSQL",
        Provider::MongoDb => "MongoDB",
    };
    SYSTEM_PROMPT_TEMPLATE
        .replace("{provider}", provider.display_name())
        .replace("{dialect}", dialect)
}

/// Seeds a conversation with the system prompt and the user's message.
pub fn build_messages(provider: Provider, user_message: &str) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(provider)),
        Message::user(user_message),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Role;

    #[test]
    fn test_system_prompt_names_provider_and_tools() {
        let prompt = build_system_prompt(Provider::MySql);
        assert!(prompt.contains("MySQL"));
        assert!(prompt.contains("list_tables"));
        assert!(prompt.contains("get_table_schema"));
        assert!(prompt.contains("execute_sql_query"));
    }

    #[test]
    fn test_supabase_uses_postgres_dialect() {
        assert!(build_system_prompt(Provider::Supabase).contains("PostgreSQL dialect"));
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages(Provider::Postgres, "How many users?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "How many users?");
    }
}
