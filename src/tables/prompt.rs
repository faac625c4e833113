//! Extraction prompts per table kind, in the language of the processed documents.

use super::kinds::TableKind;

/// Characters of document text embedded in each prompt.
pub const PROMPT_TEXT_LIMIT: usize = 3000;

const ANSWER_ONLY_JSON: &str = "Responda APENAS com o JSON válido:";

const INVESTMENT: &str = r#"Extraia os principais indicadores financeiros descritos no texto.

Retorne um JSON com um array de objetos no seguinte formato:
[
    {
        "empresa": "Nome da empresa",
        "periodo": "Período de referência (ex: 1T25)",
        "receita_bruta": valor da receita bruta (float),
        "variacao_receita_bruta": variação percentual da receita bruta em relação ao período anterior (float),
        "ebitda": valor do EBITDA ou EBITDA Ajustado (float),
        "margem_ebitda": margem EBITDA ou EBITDA Ajustado (float, em percentual),
        "variacao_ebitda": variação percentual do EBITDA ou EBITDA Ajustado em relação ao período anterior (float),
        "lucro_liquido": valor do lucro líquido ou lucro líquido ajustado (float),
        "margem_lucro_liquido": margem do lucro líquido ou lucro líquido ajustado (float, em percentual),
        "variacao_lucro_liquido": variação percentual do lucro líquido ou lucro líquido ajustado em relação ao período anterior (float)
    },
    ...
]

Instruções:
- Priorize os valores ajustados (EBITDA Ajustado e Lucro Líquido Ajustado), quando disponíveis.
- Extraia também as margens correspondentes, em percentual (ex: "21,9%" → 21.9).
- Extraia a variação percentual entre o período atual e o mesmo período do ano anterior (ex: "crescimento de 33%" → 33.0).
- Os valores monetários devem estar em float, mesmo que apresentados em milhares ou bilhões de reais.
- Caso alguma informação não esteja disponível, preencha com null ou string vazia."#;

const FIXED_INCOME: &str = r#"Extraia informações sobre os investimentos em renda fixa descritos no texto.

Retorne um JSON com um array de objetos no seguinte formato:
[
    {
        "banco": nome da instituição financeira (string),
        "tipo_carteira": tipo da carteira, ex: RENDA FIXA (string),
        "tipo": tipo do investimento, ex: PÓS-FIXADA ou INFLAÇÃO (string),
        "ativo": nome do ativo (string),
        "data_aplicacao": data da aplicação no formato DD/MM/AAAA (string),
        "data_carencia": data da carência no formato DD/MM/AAAA (string),
        "data_vencimento": data de vencimento no formato DD/MM/AAAA (string),
        "taxa_compra": taxa de compra, ex: 121,00%CDI (string),
        "disponivel": se está disponível para movimentação (boolean),
        "garantia": se possui garantia (boolean),
        "valor_aplicado": valor bruto aplicado (float),
        "posicao_taxa_compra": posição na taxa de compra (float),
        "valor_liquido": valor líquido atual (float)
    },
    ...
]

Tipos de campo:
- "banco": nome da instituição (string)
- "tipo_carteira": tipo da carteira (string)
- "tipo": tipo do investimento (string)
- "ativo": nome do ativo (string)
- "data_aplicacao", "data_carencia", "data_vencimento": datas em formato DD/MM/AAAA (string)
- "taxa_compra": texto da taxa de compra (string)
- "disponivel", "garantia": valores booleanos (true ou false)
- "valor_aplicado", "posicao_taxa_compra", "valor_liquido": valores monetários (float)"#;

const CONTRACT_VALUES: &str = r#"Extraia TODOS os valores monetários encontrados e suas descrições.
Retorne um JSON com array de objetos no formato:
[
    {"Descricao": "valor total do contrato", "valor": 1234.56},
    {"Descricao": "parcela 1 da entrada", "valor": 2345.67}
]

Inclua valores como:
- Valor total do contrato
- Parcelas e entrada
- Taxas e impostos
- Multas e penalidades
- Descontos"#;

const PRODUCTS: &str = r#"Extraia TODOS os produtos, serviços ou itens mencionados.
Retorne um JSON com array de objetos no formato:
[
    {"produto_servico": "Nome do item", "detalhes": "Descrição/especificações", "categoria": "tipo"},
    {"produto_servico": "Outro item", "detalhes": "Outras especificações", "categoria": "tipo"}
]

Inclua itens como:
- Produtos físicos
- Serviços prestados
- Equipamentos
- Materiais
- Qualquer item comercializado"#;

const PAYMENT_SCHEDULE: &str = r#"Extraia informações sobre cronograma de pagamentos e datas.
Retorne um JSON com array de objetos no formato:
[
    {"Data/Prazo": "data ou prazo", "Descrição": "o que deve ser pago/feito", "Valor": "valor se houver"},
    {"Data/Prazo": "outra data", "Descrição": "outra ação", "Valor": "outro valor"}
]

Inclua:
- Datas de pagamento
- Prazos de entrega
- Vencimentos
- Cronogramas
- Marcos do projeto"#;

const PARTIES: &str = r#"Extraia informações sobre as partes envolvidas no contrato.
Retorne um JSON com array de objetos no formato:
[
    {"Tipo": "Contratante/Contratado/etc", "Nome": "nome da pessoa/empresa", "Documento": "CPF/CNPJ", "Endereço": "endereço se disponível"},
    {"Tipo": "outro tipo", "Nome": "outro nome", "Documento": "outro doc", "Endereço": "outro endereço"}
]

Inclua:
- Contratante
- Contratado
- Testemunhas
- Avalistas
- Qualquer parte mencionada"#;

/// Build the extraction prompt for `kind` over the leading part of `text`.
pub fn extraction_prompt(kind: &TableKind, text: &str) -> String {
    let excerpt: String = text.chars().take(PROMPT_TEXT_LIMIT).collect();
    let instructions = match kind {
        TableKind::Investment => INVESTMENT.to_string(),
        TableKind::FixedIncome => FIXED_INCOME.to_string(),
        TableKind::ContractValues => CONTRACT_VALUES.to_string(),
        TableKind::Products => PRODUCTS.to_string(),
        TableKind::PaymentSchedule => PAYMENT_SCHEDULE.to_string(),
        TableKind::Parties => PARTIES.to_string(),
        TableKind::Other(table_type) => format!(
            "Extraia dados relevantes para criar uma tabela sobre: {table_type}\n\
             Analise o contexto e retorne um JSON com array de objetos adequado ao tipo de dados.\n\
             Seja criativo e específico baseado no conteúdo do documento."
        ),
    };

    format!(
        "Analise o seguinte texto de documento e extraia dados para criar uma tabela do tipo: {id}\n\n\
         TEXTO DO DOCUMENTO:\n{excerpt}...\n\n{instructions}\n\n{ANSWER_ONLY_JSON}",
        id = kind.id()
    )
}
