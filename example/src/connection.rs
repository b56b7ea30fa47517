use std::env::var;
use netro::{Config, Connection, Result};


pub async fn main() -> Result<()> {

    if let Ok(url) = var("DATABASE_URL") {
        let mut conn = Connection::connect(&url).await?;
        conn.create_command("SELECT 1").execute().await?;
        conn.close().await?;
    }

    let mut conn = Connection::connect_env().await?;
    println!("server {:?}, handshake v{}", conn.server_version(), conn.handshake_version());
    conn.create_command("SELECT 1").execute().await?;
    conn.close().await?;

    let config = Config::from_env().application_name("netro-example");
    let mut conn = Connection::connect_with(config).await?;
    conn.on_notice(|notice| println!("{notice}"));
    conn.create_command("CREATE TEMP TABLE netro_notice(id int)").execute().await?;
    conn.create_command("DROP TABLE netro_notice").execute().await?;
    conn.close().await?;

    Ok(())
}
