use std::time::Duration;
use netro::{Connection, Result};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    conn.create_command("CREATE TEMP TABLE netro_cancel(id int)").execute().await?;

    // cancel from another task

    let Some(canceller) = conn.canceller() else {
        return Ok(());
    };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel().await
    });

    let err = conn
        .create_command("SELECT COUNT(*) FROM _v_dual a, _v_dual b, _v_dual c, _v_dual d")
        .execute()
        .await;

    if let Err(err) = err {
        assert!(err.is_cancelled(), "{err}");
    }

    // timeout

    let err = conn
        .create_command("SELECT COUNT(*) FROM _v_dual a, _v_dual b, _v_dual c, _v_dual d")
        .timeout(Duration::from_secs(4))
        .execute()
        .await;

    if let Err(err) = err {
        assert!(err.is_timeout() || err.is_cancelled(), "{err}");
    }

    // the session survives

    conn.create_command("SELECT * FROM netro_cancel").execute().await?;
    conn.close().await?;

    Ok(())
}
